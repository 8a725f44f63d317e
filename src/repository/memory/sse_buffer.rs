use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::model::{EpochMillis, SseEventBufferEntry};
use crate::repository::SseEventBufferRepository;

#[derive(Default)]
pub struct InMemorySseEventBufferRepository {
    rows: Mutex<HashMap<String, Vec<SseEventBufferEntry>>>,
    sequence: Mutex<HashMap<String, i64>>,
}

impl InMemorySseEventBufferRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SseEventBufferRepository for InMemorySseEventBufferRepository {
    async fn buffer_event(
        &self,
        task_id: &str,
        session_id: &str,
        user_id: &str,
        event_type: &str,
        event_data: serde_json::Value,
    ) -> Result<SseEventBufferEntry, GatewayError> {
        let mut sequence = self.sequence.lock().unwrap();
        let next_seq = sequence.entry(task_id.to_string()).or_insert(0);
        *next_seq += 1;
        let entry = SseEventBufferEntry {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            event_sequence: *next_seq,
            event_type: event_type.to_string(),
            event_data,
            created_at: EpochMillis::now(),
            consumed: false,
            consumed_at: None,
        };
        self.rows
            .lock()
            .unwrap()
            .entry(task_id.to_string())
            .or_default()
            .push(entry.clone());
        Ok(entry)
    }

    async fn get_buffered_events(
        &self,
        task_id: &str,
        mark_consumed: bool,
    ) -> Result<Vec<SseEventBufferEntry>, GatewayError> {
        let mut rows = self.rows.lock().unwrap();
        let entries = rows.entry(task_id.to_string()).or_default();
        let result = entries.clone();
        if mark_consumed {
            let now = EpochMillis::now();
            for entry in entries.iter_mut() {
                if !entry.consumed {
                    entry.consumed = true;
                    entry.consumed_at = Some(now);
                }
            }
        }
        Ok(result)
    }

    async fn has_unconsumed_events(&self, task_id: &str) -> Result<bool, GatewayError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(task_id)
            .map_or(false, |entries| entries.iter().any(|e| !e.consumed)))
    }

    async fn get_unconsumed_events_for_session(
        &self,
        session_id: &str,
    ) -> Result<HashMap<String, Vec<SseEventBufferEntry>>, GatewayError> {
        let rows = self.rows.lock().unwrap();
        let mut by_task: HashMap<String, Vec<SseEventBufferEntry>> = HashMap::new();
        for entries in rows.values() {
            for entry in entries {
                if entry.session_id == session_id && !entry.consumed {
                    by_task.entry(entry.task_id.clone()).or_default().push(entry.clone());
                }
            }
        }
        Ok(by_task)
    }

    async fn delete_events_for_task(&self, task_id: &str) -> Result<u64, GatewayError> {
        let removed = self
            .rows
            .lock()
            .unwrap()
            .remove(task_id)
            .map_or(0, |entries| entries.len() as u64);
        Ok(removed)
    }

    async fn cleanup_older_than(
        &self,
        cutoff_ms: EpochMillis,
        batch_size: u32,
    ) -> Result<u64, GatewayError> {
        let mut rows = self.rows.lock().unwrap();
        let mut deleted = 0u64;
        for entries in rows.values_mut() {
            let before = entries.len();
            entries.retain(|e| {
                if deleted >= batch_size as u64 {
                    return true;
                }
                let stale = e.created_at.0 < cutoff_ms.0;
                if stale {
                    deleted += 1;
                }
                !stale
            });
            let _ = before;
        }
        rows.retain(|_, entries| !entries.is_empty());
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn buffering_with_no_prior_connection_leaves_entries_unconsumed() {
        let repo = InMemorySseEventBufferRepository::new();
        repo.buffer_event("t1", "s1", "u1", "status-update", serde_json::json!({}))
            .await
            .unwrap();
        assert!(repo.has_unconsumed_events("t1").await.unwrap());
        let events = repo.get_buffered_events("t1", false).await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(repo.has_unconsumed_events("t1").await.unwrap());
    }

    #[tokio::test]
    async fn marking_consumed_clears_unconsumed_flag() {
        let repo = InMemorySseEventBufferRepository::new();
        repo.buffer_event("t1", "s1", "u1", "status-update", serde_json::json!({}))
            .await
            .unwrap();
        repo.get_buffered_events("t1", true).await.unwrap();
        assert!(!repo.has_unconsumed_events("t1").await.unwrap());
    }
}

//! Live SSE connection fan-out (spec §4.2), grounded on the Python
//! `SSEManager`'s lock-guarded connection table and 100ms-timeout queue
//! puts.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::SseConfig;
use crate::sse::persistent_buffer::PersistentEventBuffer;

/// One live subscriber's outbound queue.
pub type EventSender = mpsc::Sender<Value>;
pub type EventReceiver = mpsc::Receiver<Value>;

struct ManagerState {
    /// Every live consumer queue per task id, in subscription order.
    connections: HashMap<String, Vec<EventSender>>,
    /// Tasks that have ever had at least one connection registered, so
    /// `close_all_for_task` can tell "no one ever listened" from "everyone
    /// disconnected" (spec §4.2 edge case).
    tasks_with_prior_connection: HashSet<String>,
}

/// Fans a task's events out to every live SSE connection subscribed to it,
/// falling back to the persistent buffer when nobody is currently
/// connected.
pub struct SseManager {
    state: Mutex<ManagerState>,
    config: SseConfig,
}

impl SseManager {
    pub fn new(config: SseConfig) -> Self {
        Self {
            state: Mutex::new(ManagerState {
                connections: HashMap::new(),
                tasks_with_prior_connection: HashSet::new(),
            }),
            config,
        }
    }

    /// Registers a new live subscriber for `task_id`, atomically draining
    /// any buffered backlog into the handle returned alongside it so no
    /// event is delivered twice and none is lost in the gap between
    /// "buffer drained" and "connection registered" (spec §4.2 invariant).
    pub async fn connect(
        &self,
        task_id: &str,
        buffer: &PersistentEventBuffer,
    ) -> (EventReceiver, Vec<Value>) {
        let (tx, rx) = mpsc::channel(self.config.max_queue_size);
        // Mark connected before draining: any event buffered concurrently
        // with this drain still lands in the repository, not this queue,
        // so `get_buffered_events` below is the single source of truth.
        {
            let mut state = self.state.lock().unwrap();
            state.connections.entry(task_id.to_string()).or_default().push(tx);
            state.tasks_with_prior_connection.insert(task_id.to_string());
        }
        let backlog = buffer
            .get_buffered_events(task_id, true)
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|entry| entry.event_data)
            .collect();
        (rx, backlog)
    }

    /// Publishes `event` to every live subscriber of `task_id`. A queue
    /// that doesn't accept the event within `put_timeout` is dropped from
    /// the connection list — the rest keep receiving (spec §4.2, §5).
    pub async fn publish(&self, task_id: &str, event: Value) {
        let senders: Vec<EventSender> = {
            let state = self.state.lock().unwrap();
            state.connections.get(task_id).cloned().unwrap_or_default()
        };
        if senders.is_empty() {
            return;
        }
        let mut dead = Vec::new();
        for (idx, sender) in senders.iter().enumerate() {
            let sent = tokio::time::timeout(self.config.put_timeout, sender.send(event.clone()))
                .await;
            match sent {
                Ok(Ok(())) => {}
                Ok(Err(_)) | Err(_) => {
                    log::warn!("dropping slow/closed SSE consumer for task {task_id}");
                    dead.push(idx);
                }
            }
        }
        if !dead.is_empty() {
            let mut state = self.state.lock().unwrap();
            if let Some(conns) = state.connections.get_mut(task_id) {
                for idx in dead.into_iter().rev() {
                    if idx < conns.len() {
                        conns.remove(idx);
                    }
                }
            }
        }
    }

    /// Persists `event` into the durable buffer (so a not-yet-connected or
    /// reconnecting client can replay it) and fans it out to every live
    /// connection in one call. This is the single entry point the
    /// dispatcher and scheduler use to push an event for a task id (spec
    /// §4.1 "dispatched to the SSEManager and to the persistent event
    /// buffer").
    pub async fn dispatch_event(
        &self,
        task_id: &str,
        buffer: &PersistentEventBuffer,
        event_type: &str,
        event_data: Value,
    ) {
        if let Err(err) = buffer.buffer_event(task_id, event_type, event_data.clone()).await {
            log::warn!("failed to persist SSE event for task {task_id}: {err}");
        }
        self.publish(task_id, event_data).await;
    }

    /// Whether `task_id` has at least one live connection right now.
    pub fn has_connection(&self, task_id: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .connections
            .get(task_id)
            .map_or(false, |conns| !conns.is_empty())
    }

    /// Drops every live connection for `task_id` when the task finishes.
    /// If no connection was ever registered, the buffered events are left
    /// alone for a later session-level replay (spec §4.2 edge case).
    pub fn close_all_for_task(&self, task_id: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        let had_connection = state.tasks_with_prior_connection.remove(task_id);
        state.connections.remove(task_id);
        had_connection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::repository::memory::InMemorySseEventBufferRepository;

    #[tokio::test]
    async fn connect_drains_buffered_backlog() {
        let manager = SseManager::new(SseConfig::default());
        let buffer = PersistentEventBuffer::new(Arc::new(InMemorySseEventBufferRepository::new()));
        buffer.register_task("t1", "s1", "u1");
        buffer
            .buffer_event("t1", "status-update", serde_json::json!({"n": 1}))
            .await
            .unwrap();
        let (_rx, backlog) = manager.connect("t1", &buffer).await;
        assert_eq!(backlog.len(), 1);
        assert!(manager.has_connection("t1"));
    }

    #[tokio::test]
    async fn publish_fans_out_to_every_connection() {
        let manager = SseManager::new(SseConfig::default());
        let buffer = PersistentEventBuffer::new(Arc::new(InMemorySseEventBufferRepository::new()));
        buffer.register_task("t1", "s1", "u1");
        let (mut rx1, _) = manager.connect("t1", &buffer).await;
        let (mut rx2, _) = manager.connect("t1", &buffer).await;
        manager.publish("t1", serde_json::json!({"hello": "world"})).await;
        assert_eq!(rx1.recv().await.unwrap()["hello"], "world");
        assert_eq!(rx2.recv().await.unwrap()["hello"], "world");
    }

    #[test]
    fn close_without_prior_connection_reports_false() {
        let manager = SseManager::new(SseConfig::default());
        assert!(!manager.close_all_for_task("never-connected"));
    }
}

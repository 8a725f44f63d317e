use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::model::{EpochMillis, Feedback};
use crate::repository::FeedbackRepository;

#[derive(Default)]
pub struct InMemoryFeedbackRepository {
    rows: Mutex<HashMap<String, Feedback>>,
}

impl InMemoryFeedbackRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeedbackRepository for InMemoryFeedbackRepository {
    async fn create(&self, feedback: Feedback) -> Result<Option<Feedback>, GatewayError> {
        let mut rows = self.rows.lock().unwrap();
        let duplicate = rows.values().any(|f| {
            f.user_id == feedback.user_id
                && f.task_id == feedback.task_id
                && f.rating == feedback.rating
        });
        if duplicate {
            return Ok(None);
        }
        rows.insert(feedback.id.clone(), feedback.clone());
        Ok(Some(feedback))
    }

    async fn delete_older_than(
        &self,
        cutoff_ms: EpochMillis,
        batch_size: u32,
    ) -> Result<u64, GatewayError> {
        let mut rows = self.rows.lock().unwrap();
        let stale: Vec<String> = rows
            .values()
            .filter(|f| f.created_time.0 < cutoff_ms.0)
            .take(batch_size as usize)
            .map(|f| f.id.clone())
            .collect();
        for id in &stale {
            rows.remove(id);
        }
        Ok(stale.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FeedbackRating;

    fn sample(id: &str, task_id: &str, rating: FeedbackRating) -> Feedback {
        Feedback {
            id: id.to_string(),
            session_id: "s1".to_string(),
            task_id: task_id.to_string(),
            user_id: "u1".to_string(),
            rating,
            comment: None,
            created_time: EpochMillis::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_rating_is_rejected() {
        let repo = InMemoryFeedbackRepository::new();
        assert!(repo
            .create(sample("f1", "t1", FeedbackRating::Up))
            .await
            .unwrap()
            .is_some());
        assert!(repo
            .create(sample("f2", "t1", FeedbackRating::Up))
            .await
            .unwrap()
            .is_none());
    }
}

//! Up/down task feedback (spec §3 Feedback entity, §6.1 `POST /feedback`),
//! supplemented from `original_source`'s `feedback_service.py`: a thin,
//! idempotent-by-shortcut insert in front of `FeedbackRepository`.

use std::sync::Arc;

use crate::error::GatewayError;
use crate::model::{EpochMillis, Feedback, FeedbackRating};
use crate::repository::FeedbackRepository;

pub struct FeedbackService {
    repo: Arc<dyn FeedbackRepository>,
}

impl FeedbackService {
    pub fn new(repo: Arc<dyn FeedbackRepository>) -> Self {
        Self { repo }
    }

    /// Creates a feedback row. Returns `Ok(None)` when an identical
    /// `(user, task, rating)` already exists — the REST adapter still
    /// answers 202 either way (spec §3 lifecycle, §6.1).
    pub async fn submit(
        &self,
        session_id: &str,
        task_id: &str,
        user_id: &str,
        rating: FeedbackRating,
        comment: Option<String>,
    ) -> Result<Option<Feedback>, GatewayError> {
        self.repo
            .create(Feedback {
                id: uuid::Uuid::new_v4().to_string(),
                session_id: session_id.to_string(),
                task_id: task_id.to_string(),
                user_id: user_id.to_string(),
                rating,
                comment,
                created_time: EpochMillis::now(),
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory::InMemoryFeedbackRepository;

    #[tokio::test]
    async fn duplicate_submission_is_a_no_op() {
        let service = FeedbackService::new(Arc::new(InMemoryFeedbackRepository::new()));
        let first = service
            .submit("s1", "t1", "u1", FeedbackRating::Up, None)
            .await
            .unwrap();
        assert!(first.is_some());
        let second = service
            .submit("s1", "t1", "u1", FeedbackRating::Up, Some("nice".to_string()))
            .await
            .unwrap();
        assert!(second.is_none());
    }
}

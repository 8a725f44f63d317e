use async_trait::async_trait;

use crate::error::{classify_db_error, GatewayError};
use crate::model::{EpochMillis, Feedback, FeedbackRating};
use crate::repository::FeedbackRepository;

use super::PgBackend;

fn rating_str(rating: FeedbackRating) -> &'static str {
    match rating {
        FeedbackRating::Up => "up",
        FeedbackRating::Down => "down",
    }
}

#[async_trait]
impl FeedbackRepository for PgBackend {
    async fn create(&self, feedback: Feedback) -> Result<Option<Feedback>, GatewayError> {
        let result = sqlx::query(
            "INSERT INTO feedback (id, session_id, task_id, user_id, rating, comment, created_time) \
             VALUES ($1,$2,$3,$4,$5,$6,$7) ON CONFLICT (user_id, task_id, rating) DO NOTHING",
        )
        .bind(&feedback.id)
        .bind(&feedback.session_id)
        .bind(&feedback.task_id)
        .bind(&feedback.user_id)
        .bind(rating_str(feedback.rating))
        .bind(&feedback.comment)
        .bind(feedback.created_time.0)
        .execute(&self.pool)
        .await
        .map_err(classify_db_error)?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(feedback))
    }

    async fn delete_older_than(
        &self,
        cutoff_ms: EpochMillis,
        batch_size: u32,
    ) -> Result<u64, GatewayError> {
        let result = sqlx::query(
            "DELETE FROM feedback WHERE id IN \
             (SELECT id FROM feedback WHERE created_time < $1 LIMIT $2)",
        )
        .bind(cutoff_ms.0)
        .bind(batch_size as i64)
        .execute(&self.pool)
        .await
        .map_err(classify_db_error)?;
        Ok(result.rows_affected())
    }
}

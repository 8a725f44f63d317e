use serde::{Deserialize, Serialize};

use super::ids::EpochMillis;

/// An up/down rating on a task (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub id: String,
    pub session_id: String,
    pub task_id: String,
    pub user_id: String,
    pub rating: FeedbackRating,
    pub comment: Option<String>,
    pub created_time: EpochMillis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackRating {
    Up,
    Down,
}

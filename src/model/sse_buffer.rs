use serde::{Deserialize, Serialize};

use super::ids::EpochMillis;

/// A persisted SSE payload, enabling replay for background tasks (spec §3,
/// §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SseEventBufferEntry {
    pub id: String,
    pub task_id: String,
    pub session_id: String,
    pub user_id: String,
    /// Monotonic per `task_id`, assigned at insert time.
    pub event_sequence: i64,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub created_at: EpochMillis,
    pub consumed: bool,
    pub consumed_at: Option<EpochMillis>,
}

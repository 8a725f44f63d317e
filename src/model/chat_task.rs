use serde::{Deserialize, Serialize};

use super::ids::EpochMillis;

/// One user↔agent exchange, upserted by the client after a streamed task
/// ends (spec §3, §4.5). `message_bubbles` and `task_metadata` are opaque
/// JSON strings — the frontend owns their schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTask {
    /// Equal to the A2A task id that produced it (spec §3 invariant).
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub user_message: Option<String>,
    pub message_bubbles: String,
    pub task_metadata: String,
    pub created_time: EpochMillis,
    pub updated_time: Option<EpochMillis>,
}

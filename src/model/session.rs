use serde::{Deserialize, Serialize};

use super::ids::EpochMillis;

/// A user conversation container (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub name: Option<String>,
    pub agent_id: Option<String>,
    pub project_id: Option<String>,
    pub created_time: EpochMillis,
    pub updated_time: EpochMillis,
    pub gateway_type: Option<String>,
    pub external_context_id: Option<String>,
    pub is_compression_branch: bool,
    pub compression_metadata: Option<CompressionMetadata>,
    pub deleted_at: Option<EpochMillis>,
}

/// Recorded on a session created via compress-and-branch (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionMetadata {
    pub parent_session_id: String,
    pub compressed_message_count: usize,
    pub estimated_source_tokens: usize,
    pub estimated_summary_tokens: usize,
    pub referenced_artifacts: Vec<String>,
}

impl Session {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

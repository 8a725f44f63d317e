use serde::{Deserialize, Serialize};

use super::ids::EpochMillis;

/// A named system-prompt container, user-owned and optionally shareable
/// (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub user_id: String,
    pub description: Option<String>,
    pub system_prompt: Option<String>,
    pub default_agent_id: Option<String>,
    pub created_at: EpochMillis,
    pub updated_at: Option<EpochMillis>,
    pub deleted_at: Option<EpochMillis>,
}

impl Project {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::ids::EpochMillis;

/// A cost aggregate per `(user, month)` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyUsage {
    pub user_id: String,
    /// `YYYY-MM`.
    pub month: String,
    pub total_usage: i64,
    pub prompt_usage: i64,
    pub completion_usage: i64,
    pub cached_usage: i64,
    pub usage_by_model: HashMap<String, i64>,
    pub usage_by_source: HashMap<String, i64>,
    pub created_at: EpochMillis,
    pub updated_at: EpochMillis,
}

/// Audit row per LLM call (spec §3). `token_cost` is in credits, where
/// 1,000,000 credits == $1.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransaction {
    pub id: String,
    pub user_id: String,
    pub task_id: Option<String>,
    pub transaction_type: TransactionType,
    pub model: String,
    pub raw_tokens: i64,
    pub token_cost: i64,
    pub rate: f64,
    pub source: String,
    pub tool_name: Option<String>,
    pub context: Option<String>,
    pub created_at: EpochMillis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Prompt,
    Completion,
    Cached,
}

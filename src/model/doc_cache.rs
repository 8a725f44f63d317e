use serde::{Deserialize, Serialize};

use super::ids::EpochMillis;

/// A cached Office→PDF conversion result, keyed by `(contentHash,
/// fileExtension)` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocConversionCacheEntry {
    pub content_hash: String,
    pub file_extension: String,
    pub original_size_bytes: i64,
    #[serde(skip_serializing)]
    pub pdf_data: Vec<u8>,
    pub pdf_size_bytes: i64,
    pub created_at: EpochMillis,
    pub last_accessed_at: EpochMillis,
    pub access_count: i64,
}

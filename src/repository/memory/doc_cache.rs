use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::model::{DocConversionCacheEntry, EpochMillis};
use crate::repository::DocConversionCacheRepository;

fn key(content_hash: &str, file_extension: &str) -> String {
    format!("{content_hash}:{file_extension}")
}

#[derive(Default)]
pub struct InMemoryDocConversionCacheRepository {
    rows: Mutex<HashMap<String, DocConversionCacheEntry>>,
}

impl InMemoryDocConversionCacheRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocConversionCacheRepository for InMemoryDocConversionCacheRepository {
    async fn put_if_absent(&self, entry: DocConversionCacheEntry) -> Result<bool, GatewayError> {
        let mut rows = self.rows.lock().unwrap();
        let k = key(&entry.content_hash, &entry.file_extension);
        if rows.contains_key(&k) {
            return Ok(false);
        }
        rows.insert(k, entry);
        Ok(true)
    }

    async fn get(
        &self,
        content_hash: &str,
        file_extension: &str,
    ) -> Result<Option<DocConversionCacheEntry>, GatewayError> {
        Ok(self.rows.lock().unwrap().get(&key(content_hash, file_extension)).cloned())
    }

    async fn touch_access(&self, content_hash: &str, file_extension: &str) -> Result<(), GatewayError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(entry) = rows.get_mut(&key(content_hash, file_extension)) {
            entry.last_accessed_at = EpochMillis::now();
            entry.access_count += 1;
        }
        Ok(())
    }

    async fn evict_lru(&self, keep_newest: usize) -> Result<u64, GatewayError> {
        let mut rows = self.rows.lock().unwrap();
        let mut entries: Vec<_> = rows.values().cloned().collect();
        entries.sort_by(|a, b| b.last_accessed_at.0.cmp(&a.last_accessed_at.0));
        let evict_keys: Vec<String> = entries
            .into_iter()
            .skip(keep_newest)
            .map(|e| key(&e.content_hash, &e.file_extension))
            .collect();
        for k in &evict_keys {
            rows.remove(k);
        }
        Ok(evict_keys.len() as u64)
    }
}

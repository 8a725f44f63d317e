//! Office-document → PDF conversion with an LRU cache keyed by content
//! hash (spec §3 `DocConversionCacheEntry`, §5 timeout/retry language),
//! supplemented from `original_source`'s `document_conversion_service.py`
//! and `document_conversion_cache_repository.py`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::GatewayError;
use crate::model::{DocConversionCacheEntry, EpochMillis};
use crate::repository::DocConversionCacheRepository;

/// The external office-converter subprocess, kept behind a trait so the
/// core never depends on a real converter binary being present (spec §1
/// Non-goals).
#[async_trait]
pub trait OfficeConverter: Send + Sync {
    async fn convert_to_pdf(&self, input: &[u8], file_extension: &str) -> Result<Vec<u8>, GatewayError>;
}

/// Wall-clock timeout for the whole conversion (spec §5, default 30s).
const WALL_CLOCK_TIMEOUT: Duration = Duration::from_secs(30);
/// Subprocess timeout, capped by the wall clock (spec §5, ≤60s).
const SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(30);
/// Output-file polling backoff: 0.2s initial, 2s max, 10 attempts (spec §5).
const POLL_INITIAL: Duration = Duration::from_millis(200);
const POLL_MAX: Duration = Duration::from_secs(2);
const POLL_MAX_ATTEMPTS: u32 = 10;

/// Shells out to a LibreOffice-style `soffice --convert-to pdf` CLI,
/// polling for the output file with bounded exponential backoff because
/// the subprocess writes it asynchronously relative to its own exit (spec
/// §5).
pub struct SubprocessOfficeConverter {
    binary_path: String,
}

impl SubprocessOfficeConverter {
    pub fn new(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    async fn wait_for_output(&self, output_path: &std::path::Path) -> Result<(), GatewayError> {
        let mut backoff = POLL_INITIAL;
        for attempt in 1..=POLL_MAX_ATTEMPTS {
            if tokio::fs::metadata(output_path).await.is_ok() {
                return Ok(());
            }
            if attempt == POLL_MAX_ATTEMPTS {
                break;
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(POLL_MAX);
        }
        Err(GatewayError::UpstreamTimeout(format!(
            "converter never produced {}",
            output_path.display()
        )))
    }
}

#[async_trait]
impl OfficeConverter for SubprocessOfficeConverter {
    async fn convert_to_pdf(&self, input: &[u8], file_extension: &str) -> Result<Vec<u8>, GatewayError> {
        let work_dir = tempfile::tempdir()
            .map_err(|e| GatewayError::Internal(format!("failed to create work dir: {e}")))?;
        let input_path = work_dir.path().join(format!("input.{file_extension}"));
        tokio::fs::write(&input_path, input)
            .await
            .map_err(|e| GatewayError::Internal(format!("failed to write input file: {e}")))?;

        let mut command = tokio::process::Command::new(&self.binary_path);
        command
            .arg("--headless")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(work_dir.path())
            .arg(&input_path);

        let spawn_result = tokio::time::timeout(SUBPROCESS_TIMEOUT, command.output()).await;
        match spawn_result {
            Ok(Ok(output)) if !output.status.success() => {
                return Err(GatewayError::Internal(format!(
                    "converter exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr)
                )));
            }
            Ok(Ok(_)) => {}
            Ok(Err(err)) => return Err(GatewayError::Internal(format!("failed to spawn converter: {err}"))),
            Err(_) => return Err(GatewayError::UpstreamTimeout("converter subprocess timed out".into())),
        }

        let output_path = work_dir.path().join("input.pdf");
        self.wait_for_output(&output_path).await?;
        tokio::fs::read(&output_path)
            .await
            .map_err(|e| GatewayError::Internal(format!("failed to read converted pdf: {e}")))
    }
}

pub struct DocumentConversionService {
    cache: Arc<dyn DocConversionCacheRepository>,
    converter: Arc<dyn OfficeConverter>,
}

impl DocumentConversionService {
    pub fn new(cache: Arc<dyn DocConversionCacheRepository>, converter: Arc<dyn OfficeConverter>) -> Self {
        Self { cache, converter }
    }

    /// Converts `input` (an Office document) to PDF, serving from cache on
    /// a hit and racing the subprocess against a hard wall-clock timeout
    /// on a miss (spec §5, §6.1 `POST /document-conversion/to-pdf`).
    pub async fn convert(&self, input: &[u8], file_extension: &str) -> Result<Vec<u8>, GatewayError> {
        let content_hash = hex_sha256(input);
        if let Some(cached) = self.cache.get(&content_hash, file_extension).await? {
            self.cache.touch_access(&content_hash, file_extension).await?;
            return Ok(cached.pdf_data);
        }

        let pdf_data = tokio::time::timeout(WALL_CLOCK_TIMEOUT, self.converter.convert_to_pdf(input, file_extension))
            .await
            .map_err(|_| GatewayError::UpstreamTimeout("document conversion exceeded wall-clock timeout".into()))??;

        let now = EpochMillis::now();
        let entry = DocConversionCacheEntry {
            content_hash: content_hash.clone(),
            file_extension: file_extension.to_string(),
            original_size_bytes: input.len() as i64,
            pdf_data: pdf_data.clone(),
            pdf_size_bytes: pdf_data.len() as i64,
            created_at: now,
            last_accessed_at: now,
            access_count: 1,
        };
        if !self.cache.put_if_absent(entry).await? {
            // Lost the race against a concurrent identical conversion;
            // the winner's cached row is authoritative (spec §8).
            if let Some(winner) = self.cache.get(&content_hash, file_extension).await? {
                return Ok(winner.pdf_data);
            }
        }
        Ok(pdf_data)
    }

    /// LRU eviction hook, keeping the `keep_newest` most-recently-accessed
    /// entries (spec §3 lifecycle).
    pub async fn evict_lru(&self, keep_newest: usize) -> Result<u64, GatewayError> {
        self.cache.evict_lru(keep_newest).await
    }
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Minimal hex encoding so the crate doesn't need a dedicated `hex`
/// dependency for this one call site.
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory::InMemoryDocConversionCacheRepository;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeConverter {
        calls: AtomicU32,
    }

    #[async_trait]
    impl OfficeConverter for FakeConverter {
        async fn convert_to_pdf(&self, input: &[u8], _ext: &str) -> Result<Vec<u8>, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![b'%', b'P', b'D', b'F', input.len() as u8])
        }
    }

    #[tokio::test]
    async fn second_conversion_of_identical_content_hits_cache() {
        let cache = Arc::new(InMemoryDocConversionCacheRepository::new());
        let converter = Arc::new(FakeConverter { calls: AtomicU32::new(0) });
        let service = DocumentConversionService::new(cache, converter.clone());
        let doc = b"hello office document";
        service.convert(doc, "docx").await.unwrap();
        service.convert(doc, "docx").await.unwrap();
        assert_eq!(converter.calls.load(Ordering::SeqCst), 1);
    }
}

use async_trait::async_trait;
use sqlx::Row;

use crate::error::{classify_db_error, GatewayError};
use crate::model::{DocConversionCacheEntry, EpochMillis};
use crate::repository::DocConversionCacheRepository;

use super::PgBackend;

fn row_to_entry(row: &sqlx::postgres::PgRow) -> Result<DocConversionCacheEntry, GatewayError> {
    Ok(DocConversionCacheEntry {
        content_hash: row.try_get("content_hash").map_err(classify_db_error)?,
        file_extension: row.try_get("file_extension").map_err(classify_db_error)?,
        original_size_bytes: row.try_get("original_size_bytes").map_err(classify_db_error)?,
        pdf_data: row.try_get("pdf_data").map_err(classify_db_error)?,
        pdf_size_bytes: row.try_get("pdf_size_bytes").map_err(classify_db_error)?,
        created_at: EpochMillis(row.try_get("created_at").map_err(classify_db_error)?),
        last_accessed_at: EpochMillis(row.try_get("last_accessed_at").map_err(classify_db_error)?),
        access_count: row.try_get("access_count").map_err(classify_db_error)?,
    })
}

#[async_trait]
impl DocConversionCacheRepository for PgBackend {
    async fn put_if_absent(&self, entry: DocConversionCacheEntry) -> Result<bool, GatewayError> {
        let result = sqlx::query(
            "INSERT INTO doc_conversion_cache (content_hash, file_extension, \
             original_size_bytes, pdf_data, pdf_size_bytes, created_at, last_accessed_at, \
             access_count) VALUES ($1,$2,$3,$4,$5,$6,$7,$8) \
             ON CONFLICT (content_hash, file_extension) DO NOTHING",
        )
        .bind(&entry.content_hash)
        .bind(&entry.file_extension)
        .bind(entry.original_size_bytes)
        .bind(&entry.pdf_data)
        .bind(entry.pdf_size_bytes)
        .bind(entry.created_at.0)
        .bind(entry.last_accessed_at.0)
        .bind(entry.access_count)
        .execute(&self.pool)
        .await
        .map_err(classify_db_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get(
        &self,
        content_hash: &str,
        file_extension: &str,
    ) -> Result<Option<DocConversionCacheEntry>, GatewayError> {
        let row = sqlx::query(
            "SELECT * FROM doc_conversion_cache WHERE content_hash = $1 AND file_extension = $2",
        )
        .bind(content_hash)
        .bind(file_extension)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify_db_error)?;
        row.as_ref().map(row_to_entry).transpose()
    }

    async fn touch_access(&self, content_hash: &str, file_extension: &str) -> Result<(), GatewayError> {
        let now = EpochMillis::now();
        sqlx::query(
            "UPDATE doc_conversion_cache SET last_accessed_at = $1, access_count = access_count + 1 \
             WHERE content_hash = $2 AND file_extension = $3",
        )
        .bind(now.0)
        .bind(content_hash)
        .bind(file_extension)
        .execute(&self.pool)
        .await
        .map_err(classify_db_error)?;
        Ok(())
    }

    async fn evict_lru(&self, keep_newest: usize) -> Result<u64, GatewayError> {
        let result = sqlx::query(
            "DELETE FROM doc_conversion_cache WHERE (content_hash, file_extension) IN \
             (SELECT content_hash, file_extension FROM doc_conversion_cache \
              ORDER BY last_accessed_at DESC OFFSET $1)",
        )
        .bind(keep_newest as i64)
        .execute(&self.pool)
        .await
        .map_err(classify_db_error)?;
        Ok(result.rows_affected())
    }
}

//! Retry helper for `GatewayError::TransientBackend` failures.
//!
//! Mirrors the retry-with-backoff loop the teacher's MCP HTTP client used
//! around transport calls: a handful of attempts with a fixed backoff,
//! bailing immediately on any non-transient error.

use std::time::Duration;

use crate::error::GatewayError;

const DEFAULT_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF: Duration = Duration::from_millis(50);

/// Retries `op` up to `DEFAULT_ATTEMPTS` times while it keeps failing with
/// `TransientBackend`. Any other error is returned immediately.
pub async fn with_retry<T, F, Fut>(mut op: F) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, GatewayError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(GatewayError::TransientBackend(msg)) if attempt < DEFAULT_ATTEMPTS => {
                log::warn!("transient backend error on attempt {attempt}: {msg}, retrying");
                tokio::time::sleep(DEFAULT_BACKOFF * attempt).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, GatewayError> = with_retry(|| async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(GatewayError::TransientBackend("blip".into()))
            } else {
                Ok("done")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_errors_propagate_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), GatewayError> = with_retry(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(GatewayError::NotFound("x".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

pub mod http;
pub mod limiter;
pub mod types;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use crate::error::ChainError;

/// A JSON-RPC caller bound to a single chain endpoint.
///
/// Implementations issue exactly one request per call and never retry.
#[async_trait]
pub trait RpcClient: Send + Sync {
    async fn call(&self, method: &str, params: Value) -> Result<Value, ChainError>;
}

/// Call `method` and decode the result into `T`.
/// Shape mismatches become `MalformedResponse` instead of leaking undefined fields.
pub async fn call_as<T: DeserializeOwned>(
    client: &dyn RpcClient,
    method: &str,
    params: Value,
) -> Result<T, ChainError> {
    let value = client.call(method, params).await?;
    serde_json::from_value(value).map_err(|e| ChainError::MalformedResponse {
        method: method.to_string(),
        message: e.to_string(),
    })
}

/// Retry an idempotent async operation with exponential backoff.
/// The last error is returned unchanged once retries are exhausted.
pub async fn retry_rpc<F, Fut, T>(
    max_retries: u32,
    base_delay: Duration,
    mut f: F,
) -> Result<T, ChainError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ChainError>>,
{
    let mut delay = base_delay;

    for attempt in 0..max_retries {
        match f().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                tracing::warn!(
                    attempt = attempt + 1,
                    max_retries,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "RPC call failed, retrying..."
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, Duration::from_secs(30));
            }
        }
    }

    f().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers() {
        let attempts = AtomicU32::new(0);
        let result = retry_rpc(3, Duration::from_millis(10), || async {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ChainError::transport(Some(502), "bad gateway"))
            } else {
                Ok(7u64)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_with_last_error() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = retry_rpc(2, Duration::from_millis(10), || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(ChainError::Rpc {
                code: -32000,
                message: "header not found".to_string(),
            })
        })
        .await;

        assert!(matches!(result, Err(ChainError::Rpc { code: -32000, .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

use super::limiter::RateLimiter;
use super::RpcClient;
use crate::chains::registry::ChainEndpoint;
use crate::error::ChainError;

/// JSON-RPC 2.0 over HTTP POST, one request per call.
/// Throttled by the endpoint's rate budget and bounded by its request timeout.
pub struct HttpRpcClient {
    http: reqwest::Client,
    url: String,
    chain_id: String,
    limiter: RateLimiter,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

impl HttpRpcClient {
    pub fn new(endpoint: &ChainEndpoint) -> Result<Self, ChainError> {
        let http = reqwest::Client::builder()
            .timeout(endpoint.request_timeout)
            .build()
            .map_err(|e| ChainError::transport(None, format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url: endpoint.url.clone(),
            chain_id: endpoint.chain_id.clone(),
            limiter: RateLimiter::new(endpoint.requests_per_second),
            next_id: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl RpcClient for HttpRpcClient {
    async fn call(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        self.limiter.acquire().await;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        tracing::trace!(chain = %self.chain_id, method, id, "RPC request");

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let message = if e.is_timeout() {
                    format!("{} deadline exceeded: {}", method, e)
                } else {
                    e.to_string()
                };
                ChainError::transport(e.status().map(|s| s.as_u16()), message)
            })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ChainError::transport(Some(status), e.to_string()))?;

        parse_response(method, status, &text)
    }
}

/// Turn an HTTP status and body into the JSON-RPC result.
fn parse_response(method: &str, status: u16, body: &str) -> Result<Value, ChainError> {
    if !(200..300).contains(&status) {
        let snippet: String = body.chars().take(200).collect();
        return Err(ChainError::transport(Some(status), snippet));
    }

    let envelope: JsonRpcEnvelope =
        serde_json::from_str(body).map_err(|e| ChainError::MalformedResponse {
            method: method.to_string(),
            message: e.to_string(),
        })?;

    if let Some(err) = envelope.error {
        return Err(ChainError::Rpc {
            code: err.code,
            message: err.message,
        });
    }

    Ok(envelope.result.unwrap_or(Value::Null))
}

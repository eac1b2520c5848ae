use std::collections::HashMap;
use std::time::Duration;

use crate::config::ChainConfig;
use crate::error::ChainError;

/// Connection details for one chain. Immutable once the registry is built.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainEndpoint {
    pub chain_id: String,
    pub url: String,
    pub ws_url: Option<String>,
    pub requests_per_second: u32,
    pub request_timeout: Duration,
    pub trace_calls: bool,
    pub indexed_history: bool,
}

impl ChainEndpoint {
    /// Endpoint with default timeout and all optional capabilities enabled.
    pub fn new(chain_id: impl Into<String>, url: impl Into<String>, requests_per_second: u32) -> Self {
        Self {
            chain_id: chain_id.into(),
            url: url.into(),
            ws_url: None,
            requests_per_second,
            request_timeout: Duration::from_secs(10),
            trace_calls: true,
            indexed_history: true,
        }
    }

    pub fn with_ws(mut self, ws_url: impl Into<String>) -> Self {
        self.ws_url = Some(ws_url.into());
        self
    }
}

impl From<&ChainConfig> for ChainEndpoint {
    fn from(config: &ChainConfig) -> Self {
        Self {
            chain_id: config.name.clone(),
            url: config.rpc_http.clone(),
            ws_url: config.rpc_ws.clone(),
            requests_per_second: config.requests_per_second,
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            trace_calls: config.trace_calls,
            indexed_history: config.indexed_history,
        }
    }
}

/// Static lookup from chain id to endpoint.
#[derive(Debug, Clone, Default)]
pub struct ChainRegistry {
    endpoints: HashMap<String, ChainEndpoint>,
}

impl ChainRegistry {
    pub fn new(endpoints: impl IntoIterator<Item = ChainEndpoint>) -> Self {
        let endpoints = endpoints
            .into_iter()
            .map(|e| (e.chain_id.clone(), e))
            .collect();
        Self { endpoints }
    }

    /// Build the registry from the configured chains.
    pub fn from_config(chains: &[ChainConfig]) -> Self {
        let registry = Self::new(chains.iter().map(ChainEndpoint::from));
        tracing::info!(chains = registry.len(), "Chain registry built");
        registry
    }

    pub fn get(&self, chain_id: &str) -> Result<&ChainEndpoint, ChainError> {
        self.endpoints
            .get(chain_id)
            .ok_or_else(|| ChainError::UnsupportedChain(chain_id.to_string()))
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &ChainEndpoint> {
        self.endpoints.values()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

use alloy::primitives::B256;
use serde::Deserialize;
use std::collections::HashSet;
use std::str::FromStr;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub chains: Vec<ChainConfig>,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    pub name: String,
    pub rpc_http: String,
    pub rpc_ws: Option<String>,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_true")]
    pub trace_calls: bool,
    #[serde(default = "default_true")]
    pub indexed_history: bool,
}

fn default_requests_per_second() -> u32 {
    25
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

// ============================================================
// Risk Heuristics Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct RiskConfig {
    #[serde(default = "default_high_value_ether")]
    pub high_value_ether: f64,
    #[serde(default = "default_new_address_max_nonce")]
    pub new_address_max_nonce: u64,
    #[serde(default = "default_suspicious_transfer_count")]
    pub suspicious_transfer_count: usize,
    /// Extra event topic hashes treated as mixer activity, on top of the built-in set.
    #[serde(default)]
    pub mixer_signatures: Vec<String>,
    pub known_risk_path: Option<String>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            high_value_ether: default_high_value_ether(),
            new_address_max_nonce: default_new_address_max_nonce(),
            suspicious_transfer_count: default_suspicious_transfer_count(),
            mixer_signatures: Vec::new(),
            known_risk_path: None,
        }
    }
}

fn default_high_value_ether() -> f64 {
    50.0
}

fn default_new_address_max_nonce() -> u64 {
    5
}

fn default_suspicious_transfer_count() -> usize {
    10
}

// ============================================================
// Address History Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_indexed_method")]
    pub indexed_method: String,
    #[serde(default = "default_provider_page_cap")]
    pub provider_page_cap: usize,
    #[serde(default = "default_fallback_block_budget")]
    pub fallback_block_budget: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            indexed_method: default_indexed_method(),
            provider_page_cap: default_provider_page_cap(),
            fallback_block_budget: default_fallback_block_budget(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

fn default_indexed_method() -> String {
    "alchemy_getAssetTransfers".to_string()
}

fn default_provider_page_cap() -> usize {
    1000
}

fn default_fallback_block_budget() -> u64 {
    100
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

// ============================================================
// Cluster Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct ClusterConfig {
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
    #[serde(default = "default_materiality_ether")]
    pub materiality_ether: f64,
    #[serde(default = "default_max_depth")]
    pub default_max_depth: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            history_cap: default_history_cap(),
            materiality_ether: default_materiality_ether(),
            default_max_depth: default_max_depth(),
        }
    }
}

fn default_history_cap() -> usize {
    20
}

fn default_materiality_ether() -> f64 {
    0.1
}

fn default_max_depth() -> u32 {
    2
}

// ============================================================
// Live Monitor Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Receipt polls (with backoff) before a matched pending transaction is dropped.
    #[serde(default = "default_inclusion_retries")]
    pub inclusion_retries: u32,
    /// How long to poll blocks over HTTP before retrying a lost WebSocket.
    #[serde(default = "default_ws_retry_ms")]
    pub ws_retry_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            inclusion_retries: default_inclusion_retries(),
            ws_retry_ms: default_ws_retry_ms(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_inclusion_retries() -> u32 {
    6
}

fn default_ws_retry_ms() -> u64 {
    60_000
}

impl Config {
    pub fn load(path: &str) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("Failed to read config file '{}': {}", path, e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| eyre::eyre!("Failed to parse config file '{}': {}", path, e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> eyre::Result<()> {
        if self.chains.is_empty() {
            return Err(eyre::eyre!("At least one chain must be configured"));
        }

        let mut seen = HashSet::new();
        for chain in &self.chains {
            if !seen.insert(chain.name.as_str()) {
                return Err(eyre::eyre!("Chain '{}' is configured twice", chain.name));
            }
            if !(chain.rpc_http.starts_with("http://") || chain.rpc_http.starts_with("https://")) {
                return Err(eyre::eyre!(
                    "Invalid rpc_http '{}' for chain '{}'",
                    chain.rpc_http,
                    chain.name
                ));
            }
            if let Some(ws) = &chain.rpc_ws {
                if !(ws.starts_with("ws://") || ws.starts_with("wss://")) {
                    return Err(eyre::eyre!(
                        "Invalid rpc_ws '{}' for chain '{}'",
                        ws,
                        chain.name
                    ));
                }
            }
            if chain.requests_per_second == 0 {
                return Err(eyre::eyre!(
                    "Chain '{}' must allow at least one request per second",
                    chain.name
                ));
            }
        }

        for sig in &self.risk.mixer_signatures {
            B256::from_str(sig)
                .map_err(|e| eyre::eyre!("Invalid mixer signature '{}': {}", sig, e))?;
        }

        if self.risk.high_value_ether < 0.0 || self.cluster.materiality_ether < 0.0 {
            return Err(eyre::eyre!("Value thresholds must be non-negative"));
        }

        Ok(())
    }
}

use alloy::primitives::{Address, B256, U256, U64};
use serde_json::json;
use std::str::FromStr;

use crate::config::RiskConfig;
use crate::rpc::types::GET_TRANSACTION_COUNT;
use crate::rpc::{call_as, RpcClient};
use crate::tx::types::{InternalTransfer, LogEntry};
use crate::units::native_to_wei;

use super::rules::{self, MixerSignatures};
use super::types::RiskIndicator;

/// Runs every transaction heuristic. Each rule emits independently; nothing here
/// can fail an assembly.
#[derive(Debug, Clone)]
pub struct RiskAnalyzer {
    high_value_wei: U256,
    new_address_max_nonce: u64,
    suspicious_transfer_count: usize,
    mixer_signatures: MixerSignatures,
}

/// The parts of an assembled transaction the heuristics look at.
pub struct RiskInput<'a> {
    pub from: Address,
    pub value_wei: U256,
    pub internal_transfers: &'a [InternalTransfer],
    pub logs: &'a [LogEntry],
}

impl RiskAnalyzer {
    pub fn new(config: &RiskConfig) -> eyre::Result<Self> {
        let extra = config
            .mixer_signatures
            .iter()
            .map(|s| {
                B256::from_str(s).map_err(|e| eyre::eyre!("Invalid mixer signature '{}': {}", s, e))
            })
            .collect::<eyre::Result<Vec<_>>>()?;

        Ok(Self {
            high_value_wei: native_to_wei(config.high_value_ether),
            new_address_max_nonce: config.new_address_max_nonce,
            suspicious_transfer_count: config.suspicious_transfer_count,
            mixer_signatures: MixerSignatures::with_defaults(extra),
        })
    }

    pub fn with_mixer_signatures(mut self, signatures: MixerSignatures) -> Self {
        self.mixer_signatures = signatures;
        self
    }

    /// Evaluate all heuristics. Only the new-address rule touches the network.
    pub async fn analyze(&self, client: &dyn RpcClient, input: &RiskInput<'_>) -> Vec<RiskIndicator> {
        let mut indicators = Vec::new();

        // Rule 1: High value
        if let Some(indicator) = rules::check_high_value(input.value_wei, self.high_value_wei) {
            indicators.push(indicator);
        }

        // Rule 2: New address (supplementary lookup, failures mean "not new")
        if let Some(nonce) = self.sender_nonce(client, input.from).await {
            if let Some(indicator) = rules::check_new_address(nonce, self.new_address_max_nonce) {
                indicators.push(indicator);
            }
        }

        // Rule 3: Trace complexity
        if let Some(indicator) = rules::check_suspicious_pattern(
            input.internal_transfers.len(),
            self.suspicious_transfer_count,
        ) {
            indicators.push(indicator);
        }

        // Rule 4: Mixer event signatures
        if let Some(indicator) = rules::check_mixer_interaction(input.logs, &self.mixer_signatures) {
            indicators.push(indicator);
        }

        indicators
    }

    async fn sender_nonce(&self, client: &dyn RpcClient, sender: Address) -> Option<u64> {
        match call_as::<U64>(client, GET_TRANSACTION_COUNT, json!([sender, "latest"])).await {
            Ok(count) => Some(count.saturating_to::<u64>()),
            Err(e) => {
                tracing::debug!(
                    address = %sender,
                    error = %e,
                    "Transaction count lookup failed, treating sender as established"
                );
                None
            }
        }
    }
}

impl Default for RiskAnalyzer {
    fn default() -> Self {
        let config = RiskConfig::default();
        Self {
            high_value_wei: native_to_wei(config.high_value_ether),
            new_address_max_nonce: config.new_address_max_nonce,
            suspicious_transfer_count: config.suspicious_transfer_count,
            mixer_signatures: MixerSignatures::default(),
        }
    }
}

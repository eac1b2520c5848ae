use alloy::primitives::{B256, U256};
use alloy::sol;
use alloy::sol_types::SolEvent;
use std::collections::HashSet;

use crate::tx::types::LogEntry;
use crate::units::wei_to_native_f64;

use super::types::{RiskIndicator, RiskKind, Severity};

// Tornado-style pool events. Their topic hashes seed the mixer signature set.
sol! {
    event Deposit(bytes32 indexed commitment, uint32 leafIndex, uint256 timestamp);
    event Withdrawal(address to, bytes32 nullifierHash, address indexed relayer, uint256 fee);
}

/// Event signatures (log topic 0) that identify mixer contracts.
#[derive(Debug, Clone, PartialEq)]
pub struct MixerSignatures {
    signatures: HashSet<B256>,
}

impl MixerSignatures {
    pub fn new(signatures: impl IntoIterator<Item = B256>) -> Self {
        Self {
            signatures: signatures.into_iter().collect(),
        }
    }

    /// Built-in set, extended with `extra`.
    pub fn with_defaults(extra: impl IntoIterator<Item = B256>) -> Self {
        let mut set = Self::new([Deposit::SIGNATURE_HASH, Withdrawal::SIGNATURE_HASH]);
        set.signatures.extend(extra);
        set
    }

    pub fn contains(&self, topic: &B256) -> bool {
        self.signatures.contains(topic)
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

impl Default for MixerSignatures {
    fn default() -> Self {
        Self::with_defaults([])
    }
}

/// Flag a transaction whose value is strictly above the threshold.
pub fn check_high_value(value_wei: U256, threshold_wei: U256) -> Option<RiskIndicator> {
    if value_wei <= threshold_wei {
        return None;
    }

    let human = wei_to_native_f64(value_wei);
    let threshold = wei_to_native_f64(threshold_wei);

    Some(RiskIndicator {
        kind: RiskKind::HighValue,
        severity: Severity::Medium,
        description: format!(
            "High value transfer of {} native units (threshold {})",
            human, threshold
        ),
        confidence: 0.9,
    })
}

/// Flag a sender whose transaction count is below `max_nonce`.
pub fn check_new_address(nonce: u64, max_nonce: u64) -> Option<RiskIndicator> {
    if nonce >= max_nonce {
        return None;
    }

    Some(RiskIndicator {
        kind: RiskKind::NewAddress,
        severity: Severity::Low,
        description: format!("Sender has only {} prior transactions", nonce),
        confidence: 0.7,
    })
}

/// Flag a transaction whose trace fans out into many value transfers.
pub fn check_suspicious_pattern(transfer_count: usize, threshold: usize) -> Option<RiskIndicator> {
    if transfer_count <= threshold {
        return None;
    }

    Some(RiskIndicator {
        kind: RiskKind::SuspiciousPattern,
        severity: Severity::Medium,
        description: format!("Complex trace with {} internal transfers", transfer_count),
        confidence: 0.6,
    })
}

/// Flag the first log whose topic 0 is a known mixer event. At most one indicator.
pub fn check_mixer_interaction(
    logs: &[LogEntry],
    signatures: &MixerSignatures,
) -> Option<RiskIndicator> {
    let log = logs
        .iter()
        .find(|log| log.topics.first().is_some_and(|t| signatures.contains(t)))?;

    Some(RiskIndicator {
        kind: RiskKind::MixerInteraction,
        severity: Severity::High,
        description: format!("Interaction with mixer contract {}", log.emitting_address),
        confidence: 0.95,
    })
}

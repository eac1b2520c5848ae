use alloy::primitives::{Address, Bytes, B256, U256};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::risk::types::{RiskIndicator, RiskKind};

/// A fully assembled transaction. Built once per assembly; never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRecord {
    pub hash: B256,
    pub chain_id: String,
    pub from: Address,
    /// `None` for contract creation.
    pub to: Option<Address>,
    pub value_wei: U256,
    pub gas_price: U256,
    pub gas_used: U256,
    pub block_number: u64,
    pub timestamp: DateTime<Utc>,
    pub status: TxStatus,
    pub internal_transfers: Vec<InternalTransfer>,
    pub logs: Vec<LogEntry>,
    pub risk_indicators: Vec<RiskIndicator>,
}

impl TransactionRecord {
    /// True if `address` is the sender or the recipient.
    pub fn touches(&self, address: Address) -> bool {
        self.from == address || self.to == Some(address)
    }

    pub fn has_indicator(&self, kind: RiskKind) -> bool {
        self.risk_indicators.iter().any(|i| i.kind == kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TxStatus {
    Success,
    Failed,
}

/// A value-carrying sub-call recovered from the call trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InternalTransfer {
    pub from: Address,
    pub to: Address,
    pub value_wei: U256,
    pub kind: TransferKind,
    /// Nesting level in the trace; top-level sub-calls are depth 1.
    pub depth: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransferKind {
    Call,
    DelegateCall,
    Create,
}

impl TransferKind {
    /// Map a callTracer frame type. Anything that is not a delegate call
    /// or a create is treated as a plain call.
    pub fn from_trace_type(call_type: &str) -> Self {
        match call_type.to_ascii_uppercase().as_str() {
            "DELEGATECALL" => Self::DelegateCall,
            "CREATE" | "CREATE2" => Self::Create,
            _ => Self::Call,
        }
    }
}

/// An event log copied verbatim from the receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub emitting_address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

//! Synthetic chain state behind the `RpcClient` trait, for unit tests.

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use crate::error::ChainError;
use crate::rpc::types::*;
use crate::rpc::RpcClient;

pub const INDEXED_METHOD: &str = "alchemy_getAssetTransfers";
pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
const DEFAULT_NONCE: u64 = 100;

/// How the mock answers the indexed-history method.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndexedMode {
    Enabled,
    Failing,
    Empty,
    Malformed,
}

#[derive(Debug, Clone)]
pub struct MockTx {
    pub hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub block: u64,
    pub internal_transfers: usize,
    pub success: bool,
    pub log_topics: Vec<B256>,
}

impl MockTx {
    pub fn new(id: u64, from: Address, to: Address, value: U256, block: u64) -> Self {
        Self {
            hash: tx_hash(id),
            from,
            to: Some(to),
            value,
            block,
            internal_transfers: 0,
            success: true,
            log_topics: Vec::new(),
        }
    }

    pub fn internal_transfers(mut self, n: usize) -> Self {
        self.internal_transfers = n;
        self
    }

    pub fn failed(mut self) -> Self {
        self.success = false;
        self
    }

    pub fn log_topic(mut self, topic: B256) -> Self {
        self.log_topics.push(topic);
        self
    }
}

pub fn tx_hash(id: u64) -> B256 {
    B256::left_padding_from(&id.to_be_bytes())
}

pub fn addr(id: u64) -> Address {
    let mut bytes = [0u8; 20];
    bytes[12..].copy_from_slice(&id.to_be_bytes());
    Address::from(bytes)
}

pub fn ether(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18))
}

pub fn block_timestamp(block: u64) -> u64 {
    GENESIS_TIMESTAMP + block * 12
}

#[derive(Default)]
struct MockState {
    txs: HashMap<B256, MockTx>,
    blocks: BTreeMap<u64, Vec<B256>>,
    nonces: HashMap<Address, u64>,
    indexed: Option<IndexedMode>,
    failing_methods: HashSet<String>,
    failing_blocks: HashSet<u64>,
    failing_txs: HashSet<B256>,
    calls: Vec<(String, Value)>,
}

#[derive(Default)]
pub struct MockChain {
    state: Mutex<MockState>,
}

impl MockChain {
    pub fn new() -> Self {
        let chain = Self::default();
        chain.set_indexed(IndexedMode::Enabled);
        chain
    }

    pub fn add_tx(&self, tx: MockTx) {
        let mut state = self.state.lock().unwrap();
        state.blocks.entry(tx.block).or_default().push(tx.hash);
        state.txs.insert(tx.hash, tx);
    }

    /// Register an empty block so the head can advance without transactions.
    pub fn add_block(&self, number: u64) {
        self.state.lock().unwrap().blocks.entry(number).or_default();
    }

    pub fn set_nonce(&self, address: Address, nonce: u64) {
        self.state.lock().unwrap().nonces.insert(address, nonce);
    }

    pub fn set_indexed(&self, mode: IndexedMode) {
        self.state.lock().unwrap().indexed = Some(mode);
    }

    pub fn fail_method(&self, method: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_methods
            .insert(method.to_string());
    }

    pub fn fail_block(&self, number: u64) {
        self.state.lock().unwrap().failing_blocks.insert(number);
    }

    /// Make every per-transaction lookup for `hash` fail.
    pub fn fail_tx(&self, hash: B256) {
        self.state.lock().unwrap().failing_txs.insert(hash);
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(m, _)| m == method)
            .count()
    }

    fn tx_json(tx: &MockTx) -> Value {
        json!({
            "hash": tx.hash,
            "from": tx.from,
            "to": tx.to,
            "value": tx.value,
            "gasPrice": "0x3b9aca00",
            "blockNumber": format!("{:#x}", tx.block),
            "input": "0x",
        })
    }

    fn receipt_json(tx: &MockTx) -> Value {
        let logs: Vec<Value> = tx
            .log_topics
            .iter()
            .map(|topic| {
                json!({
                    "address": addr(0xdead),
                    "topics": [topic],
                    "data": "0x",
                })
            })
            .collect();

        json!({
            "transactionHash": tx.hash,
            "status": if tx.success { "0x1" } else { "0x0" },
            "gasUsed": "0x5208",
            "effectiveGasPrice": "0x3b9aca00",
            "blockNumber": format!("{:#x}", tx.block),
            "logs": logs,
        })
    }

    fn trace_json(tx: &MockTx) -> Value {
        let calls: Vec<Value> = (0..tx.internal_transfers)
            .map(|i| {
                json!({
                    "type": "CALL",
                    "from": tx.to,
                    "to": addr(0x1000 + i as u64),
                    "value": "0x1",
                    "calls": [],
                })
            })
            .collect();

        json!({
            "type": "CALL",
            "from": tx.from,
            "to": tx.to,
            "value": tx.value,
            "calls": calls,
        })
    }

    fn block_json(state: &MockState, number: u64, full: bool) -> Value {
        let Some(hashes) = state.blocks.get(&number) else {
            return Value::Null;
        };
        let transactions: Vec<Value> = hashes
            .iter()
            .map(|h| {
                if full {
                    Self::tx_json(&state.txs[h])
                } else {
                    json!(h)
                }
            })
            .collect();

        json!({
            "number": format!("{:#x}", number),
            "timestamp": format!("{:#x}", block_timestamp(number)),
            "transactions": transactions,
        })
    }

    fn indexed_history(state: &MockState, params: &Value) -> Result<Value, ChainError> {
        match state.indexed {
            Some(IndexedMode::Enabled) => {}
            Some(IndexedMode::Empty) => return Ok(json!({ "transfers": [] })),
            Some(IndexedMode::Malformed) => return Ok(json!({ "unexpected": true })),
            Some(IndexedMode::Failing) | None => {
                return Err(ChainError::Rpc {
                    code: -32601,
                    message: "method not found".to_string(),
                })
            }
        }

        let query = &params[0];
        let from: Option<Address> = serde_json::from_value(query["fromAddress"].clone()).ok();
        let to: Option<Address> = serde_json::from_value(query["toAddress"].clone()).ok();
        let max = query["maxCount"]
            .as_str()
            .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok())
            .unwrap_or(u64::MAX) as usize;

        let mut matches: Vec<&MockTx> = state
            .txs
            .values()
            .filter(|tx| from.is_some_and(|f| tx.from == f) || (to.is_some() && tx.to == to))
            .collect();
        matches.sort_by(|a, b| b.block.cmp(&a.block).then(b.hash.cmp(&a.hash)));

        let transfers: Vec<Value> = matches
            .into_iter()
            .take(max)
            .map(|tx| {
                json!({
                    "hash": tx.hash,
                    "blockNum": format!("{:#x}", tx.block),
                    "category": "external",
                })
            })
            .collect();

        Ok(json!({ "transfers": transfers }))
    }

    fn param_hash(params: &Value) -> Result<B256, ChainError> {
        serde_json::from_value(params[0].clone()).map_err(|e| ChainError::Rpc {
            code: -32602,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl RpcClient for MockChain {
    async fn call(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push((method.to_string(), params.clone()));

        if state.failing_methods.contains(method) {
            return Err(ChainError::transport(Some(503), "service unavailable"));
        }

        match method {
            GET_TRANSACTION_BY_HASH | GET_TRANSACTION_RECEIPT | TRACE_TRANSACTION => {
                let hash = Self::param_hash(&params)?;
                if state.failing_txs.contains(&hash) {
                    return Err(ChainError::transport(Some(500), "internal error"));
                }
                let Some(tx) = state.txs.get(&hash) else {
                    return if method == TRACE_TRANSACTION {
                        Err(ChainError::Rpc {
                            code: -32000,
                            message: "transaction not found".to_string(),
                        })
                    } else {
                        Ok(Value::Null)
                    };
                };
                Ok(match method {
                    GET_TRANSACTION_BY_HASH => Self::tx_json(tx),
                    GET_TRANSACTION_RECEIPT => Self::receipt_json(tx),
                    _ => Self::trace_json(tx),
                })
            }
            GET_BLOCK_BY_NUMBER => {
                let number = match params[0].as_str() {
                    Some("latest") => state.blocks.keys().next_back().copied().unwrap_or(0),
                    Some(hex) => u64::from_str_radix(hex.trim_start_matches("0x"), 16).map_err(|e| {
                        ChainError::Rpc {
                            code: -32602,
                            message: e.to_string(),
                        }
                    })?,
                    None => {
                        return Err(ChainError::Rpc {
                            code: -32602,
                            message: "invalid block".to_string(),
                        })
                    }
                };
                if state.failing_blocks.contains(&number) {
                    return Err(ChainError::transport(Some(504), "gateway timeout"));
                }
                let full = params[1].as_bool().unwrap_or(false);
                Ok(Self::block_json(&state, number, full))
            }
            BLOCK_NUMBER => {
                let head = state.blocks.keys().next_back().copied().unwrap_or(0);
                Ok(json!(format!("{:#x}", head)))
            }
            GET_TRANSACTION_COUNT => {
                let address: Address = serde_json::from_value(params[0].clone()).map_err(|e| {
                    ChainError::Rpc {
                        code: -32602,
                        message: e.to_string(),
                    }
                })?;
                let nonce = state.nonces.get(&address).copied().unwrap_or(DEFAULT_NONCE);
                Ok(json!(format!("{:#x}", nonce)))
            }
            INDEXED_METHOD => Self::indexed_history(&state, &params),
            _ => Err(ChainError::Rpc {
                code: -32601,
                message: format!("the method {} does not exist", method),
            }),
        }
    }
}

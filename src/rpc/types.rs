//! Response shapes for the JSON-RPC methods the engine consumes.
//!
//! Fields we do not read are ignored; fields we do read are required unless
//! the method legitimately omits them, so a shape mismatch fails at decode time.

use alloy::primitives::{Address, Bytes, B256, U256, U64};
use serde::Deserialize;

pub const GET_TRANSACTION_BY_HASH: &str = "eth_getTransactionByHash";
pub const GET_TRANSACTION_RECEIPT: &str = "eth_getTransactionReceipt";
pub const GET_BLOCK_BY_NUMBER: &str = "eth_getBlockByNumber";
pub const BLOCK_NUMBER: &str = "eth_blockNumber";
pub const GET_TRANSACTION_COUNT: &str = "eth_getTransactionCount";
pub const TRACE_TRANSACTION: &str = "debug_traceTransaction";

/// Receipt status value meaning the transaction succeeded (post-Byzantium).
pub const RECEIPT_STATUS_SUCCESS: u64 = 1;

/// `eth_getTransactionByHash`, and full transaction bodies inside blocks.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    pub hash: B256,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    pub value: U256,
    #[serde(default)]
    pub gas_price: Option<U256>,
    #[serde(default)]
    pub block_number: Option<U64>,
}

/// `eth_getTransactionReceipt`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RpcReceipt {
    #[serde(default)]
    pub status: Option<U64>,
    pub gas_used: U256,
    #[serde(default)]
    pub effective_gas_price: Option<U256>,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub logs: Vec<RpcLog>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RpcLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

/// One frame of a `debug_traceTransaction` call with the `callTracer`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CallFrame {
    #[serde(rename = "type")]
    pub call_type: String,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub value: Option<U256>,
    #[serde(default)]
    pub calls: Vec<CallFrame>,
}

/// `eth_getBlockByNumber`; `T` is `B256` for hash-only bodies or
/// `RpcTransaction` when full bodies are requested.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RpcBlock<T> {
    pub number: U64,
    pub timestamp: U64,
    #[serde(default = "Vec::new")]
    pub transactions: Vec<T>,
}

/// Indexed history response (`alchemy_getAssetTransfers` shape).
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AssetTransfersPage {
    pub transfers: Vec<AssetTransfer>,
}

/// One transfer entry; `block_num` orders merged pages.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssetTransfer {
    pub hash: B256,
    #[serde(default)]
    pub block_num: Option<U64>,
}

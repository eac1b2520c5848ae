use alloy::primitives::{B256, U64};
use chrono::DateTime;
use serde_json::json;
use std::sync::Arc;

use crate::chains::registry::ChainEndpoint;
use crate::error::ChainError;
use crate::risk::analyzer::{RiskAnalyzer, RiskInput};
use crate::rpc::types::*;
use crate::rpc::{call_as, RpcClient};

use super::trace::flatten_call_trace;
use super::types::{LogEntry, TransactionRecord, TxStatus};

/// Reconstructs full transaction records for one chain.
#[derive(Clone)]
pub struct TransactionAssembler {
    chain: ChainEndpoint,
    client: Arc<dyn RpcClient>,
    analyzer: Arc<RiskAnalyzer>,
}

impl TransactionAssembler {
    pub fn new(chain: ChainEndpoint, client: Arc<dyn RpcClient>, analyzer: Arc<RiskAnalyzer>) -> Self {
        Self {
            chain,
            client,
            analyzer,
        }
    }

    pub fn chain(&self) -> &ChainEndpoint {
        &self.chain
    }

    pub fn client(&self) -> &dyn RpcClient {
        self.client.as_ref()
    }

    /// Fetch transaction, trace and receipt concurrently, then the block for its
    /// timestamp. Any sub-call failure fails the whole assembly.
    pub async fn assemble(&self, hash: B256) -> Result<TransactionRecord, ChainError> {
        let client = self.client.as_ref();

        let fetch_tx = async {
            call_as::<Option<RpcTransaction>>(client, GET_TRANSACTION_BY_HASH, json!([hash]))
                .await?
                .ok_or_else(|| ChainError::not_found("transaction", hash))
        };
        let fetch_trace = async {
            if !self.chain.trace_calls {
                return Ok(None);
            }
            call_as::<CallFrame>(
                client,
                TRACE_TRANSACTION,
                json!([hash, { "tracer": "callTracer" }]),
            )
            .await
            .map(Some)
        };
        let fetch_receipt = async {
            call_as::<Option<RpcReceipt>>(client, GET_TRANSACTION_RECEIPT, json!([hash]))
                .await?
                .ok_or_else(|| ChainError::not_found("receipt", hash))
        };

        let (tx, trace, receipt) = tokio::join!(fetch_tx, fetch_trace, fetch_receipt);
        // A missing transaction takes precedence over whatever the other lookups said
        let tx = tx?;
        let receipt = receipt?;
        let trace = trace?;

        let block_number = tx
            .block_number
            .or(receipt.block_number)
            .ok_or_else(|| ChainError::not_found("block", "pending"))?
            .saturating_to::<u64>();

        let block: RpcBlock<B256> = call_as::<Option<RpcBlock<B256>>>(
            client,
            GET_BLOCK_BY_NUMBER,
            json!([format!("{:#x}", block_number), false]),
        )
        .await?
        .ok_or_else(|| ChainError::not_found("block", block_number))?;

        let timestamp = DateTime::from_timestamp(block.timestamp.saturating_to::<i64>(), 0)
            .ok_or_else(|| ChainError::MalformedResponse {
                method: GET_BLOCK_BY_NUMBER.to_string(),
                message: format!("timestamp {} out of range", block.timestamp),
            })?;

        let status = if receipt.status == Some(U64::from(RECEIPT_STATUS_SUCCESS)) {
            TxStatus::Success
        } else {
            TxStatus::Failed
        };

        let internal_transfers = trace.as_ref().map(flatten_call_trace).unwrap_or_default();
        let logs: Vec<LogEntry> = receipt
            .logs
            .into_iter()
            .map(|log| LogEntry {
                emitting_address: log.address,
                topics: log.topics,
                data: log.data,
            })
            .collect();

        let risk_indicators = self
            .analyzer
            .analyze(
                client,
                &RiskInput {
                    from: tx.from,
                    value_wei: tx.value,
                    internal_transfers: &internal_transfers,
                    logs: &logs,
                },
            )
            .await;

        tracing::debug!(
            chain = %self.chain.chain_id,
            tx = %hash,
            block = block_number,
            internal = internal_transfers.len(),
            indicators = risk_indicators.len(),
            "Assembled transaction"
        );

        Ok(TransactionRecord {
            hash: tx.hash,
            chain_id: self.chain.chain_id.clone(),
            from: tx.from,
            to: tx.to,
            value_wei: tx.value,
            gas_price: receipt
                .effective_gas_price
                .or(tx.gas_price)
                .unwrap_or_default(),
            gas_used: receipt.gas_used,
            block_number,
            timestamp,
            status,
            internal_transfers,
            logs,
            risk_indicators,
        })
    }
}

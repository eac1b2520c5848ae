use alloy::primitives::{Address, B256, U64};
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;

use crate::config::HistoryConfig;
use crate::error::ChainError;
use crate::rpc::types::*;
use crate::rpc::{call_as, retry_rpc};
use crate::tx::assembler::TransactionAssembler;
use crate::tx::types::TransactionRecord;

/// Assemblies dispatched at once on the indexed path.
const ASSEMBLY_CONCURRENCY: usize = 8;

/// Best-effort transaction history for an address.
///
/// Tries the provider's indexed history first and falls back to scanning recent
/// blocks. Never returns an error; a total outage yields an empty history.
#[derive(Clone)]
pub struct HistoryFetcher {
    assembler: TransactionAssembler,
    config: HistoryConfig,
}

impl HistoryFetcher {
    pub fn new(assembler: TransactionAssembler, config: HistoryConfig) -> Self {
        Self { assembler, config }
    }

    /// Up to `limit` transactions where `address` is sender or recipient, newest first.
    pub async fn history(&self, address: Address, limit: usize) -> Vec<TransactionRecord> {
        if limit == 0 {
            return Vec::new();
        }
        let chain = &self.assembler.chain().chain_id;

        if self.assembler.chain().indexed_history {
            match self.indexed_hashes(address, limit).await {
                Ok(hashes) if !hashes.is_empty() => {
                    let records = self.assemble_all(hashes).await;
                    if !records.is_empty() {
                        tracing::debug!(
                            chain = %chain,
                            address = %address,
                            count = records.len(),
                            "History served from indexed provider"
                        );
                        return records;
                    }
                    tracing::warn!(
                        chain = %chain,
                        address = %address,
                        "Indexed history returned hashes but none assembled, scanning blocks"
                    );
                }
                Ok(_) => {
                    tracing::debug!(
                        chain = %chain,
                        address = %address,
                        "Indexed history empty, scanning recent blocks"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        chain = %chain,
                        address = %address,
                        error = %e,
                        "Indexed history failed, scanning recent blocks"
                    );
                }
            }
        }

        self.scan_recent_blocks(address, limit).await
    }

    /// Query both directions of the indexed method and merge, newest first.
    async fn indexed_hashes(&self, address: Address, limit: usize) -> Result<Vec<B256>, ChainError> {
        let client = self.assembler.client();
        let method = self.config.indexed_method.as_str();
        let max_count = limit.min(self.config.provider_page_cap).max(1);

        let query = |direction: &str| -> Value {
            let mut filter = json!({
                "fromBlock": "0x0",
                "toBlock": "latest",
                "category": ["external", "internal"],
                "order": "desc",
                "withMetadata": false,
                "maxCount": format!("{:#x}", max_count),
            });
            filter[direction] = json!(address);
            json!([filter])
        };

        let (sent, received) = tokio::try_join!(
            call_as::<AssetTransfersPage>(client, method, query("fromAddress")),
            call_as::<AssetTransfersPage>(client, method, query("toAddress")),
        )?;

        let mut transfers: Vec<AssetTransfer> =
            sent.transfers.into_iter().chain(received.transfers).collect();
        // stable sort keeps provider order for entries without a block number
        transfers.sort_by(|a, b| b.block_num.cmp(&a.block_num));

        let mut seen = HashSet::new();
        Ok(transfers
            .into_iter()
            .map(|t| t.hash)
            .filter(|h| seen.insert(*h))
            .take(limit)
            .collect())
    }

    async fn assemble_all(&self, hashes: Vec<B256>) -> Vec<TransactionRecord> {
        let mut records: Vec<TransactionRecord> = futures::stream::iter(hashes)
            .map(|hash| async move { (hash, self.assembler.assemble(hash).await) })
            .buffered(ASSEMBLY_CONCURRENCY)
            .filter_map(|(hash, result)| async move {
                match result {
                    Ok(record) => Some(record),
                    Err(e) => {
                        tracing::warn!(tx = %hash, error = %e, "Skipping history entry that failed to assemble");
                        None
                    }
                }
            })
            .collect()
            .await;

        records.sort_by(|a, b| b.block_number.cmp(&a.block_number));
        records
    }

    /// Walk back from the head over a bounded number of blocks, assembling
    /// every transaction that touches `address`.
    async fn scan_recent_blocks(&self, address: Address, limit: usize) -> Vec<TransactionRecord> {
        let client = self.assembler.client();
        let chain = &self.assembler.chain().chain_id;
        let retry_delay = Duration::from_millis(self.config.retry_base_delay_ms);

        let head = match retry_rpc(self.config.max_retries, retry_delay, || {
            call_as::<U64>(client, BLOCK_NUMBER, json!([]))
        })
        .await
        {
            Ok(head) => head.saturating_to::<u64>(),
            Err(e) => {
                tracing::warn!(chain = %chain, error = %e, "Cannot read chain head, history unavailable");
                return Vec::new();
            }
        };

        let budget = self
            .config
            .fallback_block_budget
            .min((limit as u64).saturating_mul(2));
        let mut found = Vec::new();

        tracing::debug!(chain = %chain, address = %address, head, budget, "Scanning recent blocks");

        for offset in 0..budget {
            let Some(number) = head.checked_sub(offset) else {
                break;
            };

            let block = match retry_rpc(self.config.max_retries, retry_delay, || {
                call_as::<Option<RpcBlock<RpcTransaction>>>(
                    client,
                    GET_BLOCK_BY_NUMBER,
                    json!([format!("{:#x}", number), true]),
                )
            })
            .await
            {
                Ok(Some(block)) => block,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(chain = %chain, block = number, error = %e, "Skipping unreadable block");
                    continue;
                }
            };

            let matching = block
                .transactions
                .iter()
                .filter(|tx| tx.from == address || tx.to == Some(address));

            for tx in matching {
                match self.assembler.assemble(tx.hash).await {
                    Ok(record) => {
                        found.push(record);
                        if found.len() >= limit {
                            return found;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            chain = %chain,
                            tx = %tx.hash,
                            error = %e,
                            "Skipping transaction that failed to assemble"
                        );
                    }
                }
            }
        }

        found
    }
}

use alloy::consensus::Transaction as _;
use alloy::network::TransactionResponse;
use alloy::primitives::{Address, B256, U64};
use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use futures::{Stream, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::MonitorConfig;
use crate::error::ChainError;
use crate::rpc::types::{RpcBlock, RpcReceipt, RpcTransaction, BLOCK_NUMBER, GET_BLOCK_BY_NUMBER, GET_TRANSACTION_RECEIPT};
use crate::rpc::{call_as, retry_rpc};
use crate::tx::assembler::TransactionAssembler;
use crate::tx::types::TransactionRecord;

/// Assemblies in flight per watch.
const MAX_IN_FLIGHT: usize = 8;

pub type TransactionCallback = Arc<dyn Fn(TransactionRecord) + Send + Sync>;

/// What the feed knows about a transaction before assembling it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTx {
    pub hash: B256,
    pub from: Address,
    pub to: Option<Address>,
}

impl PendingTx {
    fn touches(&self, address: Address) -> bool {
        self.from == address || self.to == Some(address)
    }
}

/// Handle to a running watch. Cancelling (or dropping the handle) stops the
/// feed; assemblies already in flight finish but their callbacks are suppressed.
pub struct WatchHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait for the feed task to exit.
    pub async fn stopped(mut self) {
        if let Err(e) = (&mut self.task).await {
            tracing::error!(error = %e, "Watch task panicked");
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Per-watch state shared by the feed and the tasks it spawns.
#[derive(Clone)]
struct Watch {
    address: Address,
    callback: TransactionCallback,
    shutdown: CancellationToken,
    permits: Arc<Semaphore>,
}

impl Watch {
    fn new(address: Address, callback: TransactionCallback, shutdown: CancellationToken) -> Self {
        Self {
            address,
            callback,
            shutdown,
            permits: Arc::new(Semaphore::new(MAX_IN_FLIGHT)),
        }
    }

    fn deliver(&self, record: TransactionRecord) {
        if record.touches(self.address) && !self.shutdown.is_cancelled() {
            (self.callback)(record);
        }
    }
}

/// Streams transactions touching one address as they appear on a chain.
#[derive(Clone)]
pub struct LiveMonitor {
    assembler: TransactionAssembler,
    poll_interval: Duration,
    inclusion_retries: u32,
    ws_retry_interval: Duration,
}

impl LiveMonitor {
    pub fn new(assembler: TransactionAssembler, config: &MonitorConfig) -> Self {
        Self {
            assembler,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            inclusion_retries: config.inclusion_retries,
            ws_retry_interval: Duration::from_millis(config.ws_retry_ms),
        }
    }

    /// Start watching `address`. `on_transaction` runs once per assembled
    /// transaction whose sender or recipient is `address`.
    pub fn watch<F>(&self, address: Address, on_transaction: F) -> WatchHandle
    where
        F: Fn(TransactionRecord) + Send + Sync + 'static,
    {
        let token = CancellationToken::new();
        let watch = Watch::new(address, Arc::new(on_transaction), token.clone());
        let monitor = self.clone();

        let task = tokio::spawn(async move {
            monitor.run(watch).await;
        });

        WatchHandle { token, task }
    }

    /// Pending-transaction subscription over WebSocket, with HTTP block polling
    /// whenever the subscription is unavailable.
    async fn run(&self, watch: Watch) {
        let chain = &self.assembler.chain().chain_id;

        let Some(ws_url) = self.assembler.chain().ws_url.clone() else {
            self.watch_http(&watch, None).await;
            return;
        };

        loop {
            match self.watch_ws(&ws_url, &watch).await {
                Ok(()) if watch.shutdown.is_cancelled() => return,
                Ok(()) => {
                    tracing::warn!(chain = %chain, "Pending transaction stream ended, falling back to HTTP polling");
                }
                Err(e) => {
                    tracing::warn!(
                        chain = %chain,
                        error = %e,
                        "WebSocket subscription failed, falling back to HTTP polling"
                    );
                }
            }

            self.watch_http(&watch, Some(self.ws_retry_interval)).await;
            if watch.shutdown.is_cancelled() {
                return;
            }
            tracing::info!(chain = %chain, "Retrying WebSocket subscription");
        }
    }

    async fn watch_ws(&self, ws_url: &str, watch: &Watch) -> eyre::Result<()> {
        let provider = ProviderBuilder::new().connect_ws(WsConnect::new(ws_url)).await?;

        let sub = provider.subscribe_full_pending_transactions().await?;
        let stream = sub.into_stream().map(|tx| PendingTx {
            hash: tx.tx_hash(),
            from: tx.from(),
            to: tx.to(),
        });

        tracing::info!(
            chain = %self.assembler.chain().chain_id,
            address = %watch.address,
            "Pending transaction subscription active"
        );

        self.follow_pending(stream, watch).await;
        Ok(())
    }

    /// Drive a pending-transaction feed until it ends or the watch is cancelled.
    /// Only transactions touching the watched address are ever assembled.
    async fn follow_pending<S>(&self, stream: S, watch: &Watch)
    where
        S: Stream<Item = PendingTx>,
    {
        let mut stream = std::pin::pin!(stream);

        loop {
            tokio::select! {
                maybe_tx = stream.next() => {
                    match maybe_tx {
                        Some(pending) if pending.touches(watch.address) => {
                            self.await_inclusion(pending.hash, watch);
                        }
                        Some(_) => {}
                        None => break,
                    }
                }
                _ = watch.shutdown.cancelled() => {
                    tracing::info!(address = %watch.address, "Watch cancelled");
                    break;
                }
            }
        }
    }

    /// Poll the receipt of a matched pending transaction until it is mined,
    /// then assemble and deliver it.
    fn await_inclusion(&self, hash: B256, watch: &Watch) {
        let assembler = self.assembler.clone();
        let watch = watch.clone();
        let retries = self.inclusion_retries;
        let base_delay = self.poll_interval;

        tokio::spawn(async move {
            let client = assembler.client();
            let mined = retry_rpc(retries, base_delay, move || async move {
                call_as::<Option<RpcReceipt>>(client, GET_TRANSACTION_RECEIPT, json!([hash]))
                    .await?
                    .map(|_| ())
                    .ok_or_else(|| ChainError::not_found("receipt", hash))
            });

            let mined = tokio::select! {
                biased;
                _ = watch.shutdown.cancelled() => return,
                result = mined => result,
            };

            if let Err(e) = mined {
                tracing::debug!(tx = %hash, error = %e, "Pending transaction not mined in time, dropping");
                return;
            }

            let Ok(_permit) = watch.permits.clone().acquire_owned().await else {
                return;
            };
            match assembler.assemble(hash).await {
                Ok(record) => watch.deliver(record),
                Err(e) => {
                    tracing::warn!(
                        chain = %assembler.chain().chain_id,
                        tx = %hash,
                        error = %e,
                        "Skipping transaction that failed to assemble"
                    );
                }
            }
        });
    }

    /// Poll the head and scan each new block for transactions touching the
    /// watched address. Runs until cancelled, or for `run_for` when given.
    async fn watch_http(&self, watch: &Watch, run_for: Option<Duration>) {
        let chain = &self.assembler.chain().chain_id;
        let client = self.assembler.client();
        let deadline = run_for.map(|d| tokio::time::Instant::now() + d);
        let mut last_block: Option<u64> = None;

        tracing::info!(
            chain = %chain,
            address = %watch.address,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "HTTP polling active"
        );

        loop {
            match call_as::<U64>(client, BLOCK_NUMBER, json!([])).await {
                Ok(head) => {
                    let head = head.saturating_to::<u64>();
                    match last_block {
                        // start from the current head; history is not replayed
                        None => last_block = Some(head),
                        Some(last) if head > last => {
                            for number in (last + 1)..=head {
                                if watch.shutdown.is_cancelled() {
                                    break;
                                }
                                self.scan_block(number, watch).await;
                            }
                            last_block = Some(head);
                        }
                        Some(_) => {}
                    }
                }
                Err(e) => {
                    tracing::warn!(chain = %chain, error = %e, "Failed to get block number");
                }
            }

            if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
                return;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = watch.shutdown.cancelled() => {
                    tracing::info!(chain = %chain, address = %watch.address, "Watch cancelled");
                    break;
                }
            }
        }
    }

    /// Fetch one block with full bodies and assemble only the matching transactions.
    async fn scan_block(&self, number: u64, watch: &Watch) {
        let chain = &self.assembler.chain().chain_id;
        let block = call_as::<Option<RpcBlock<RpcTransaction>>>(
            self.assembler.client(),
            GET_BLOCK_BY_NUMBER,
            json!([format!("{:#x}", number), true]),
        )
        .await;

        let matching: Vec<B256> = match block {
            Ok(Some(block)) => block
                .transactions
                .into_iter()
                .filter(|tx| tx.from == watch.address || tx.to == Some(watch.address))
                .map(|tx| tx.hash)
                .collect(),
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(chain = %chain, block = number, error = %e, "Skipping unreadable block");
                return;
            }
        };

        futures::stream::iter(matching)
            .map(|hash| async move { (hash, self.assembler.assemble(hash).await) })
            .buffer_unordered(MAX_IN_FLIGHT)
            .for_each(|(hash, result)| async move {
                match result {
                    Ok(record) => watch.deliver(record),
                    Err(e) => {
                        tracing::warn!(
                            chain = %chain,
                            tx = %hash,
                            error = %e,
                            "Skipping transaction that failed to assemble"
                        );
                    }
                }
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::registry::ChainEndpoint;
    use crate::risk::analyzer::RiskAnalyzer;
    use crate::rpc::types::{GET_TRANSACTION_BY_HASH, GET_TRANSACTION_COUNT, TRACE_TRANSACTION};
    use crate::testing::*;
    use tokio::sync::mpsc;

    const POLL: Duration = Duration::from_millis(2000);

    fn monitor(chain: Arc<MockChain>) -> LiveMonitor {
        let endpoint = ChainEndpoint::new("ethereum", "http://localhost:8545", 100);
        let assembler = TransactionAssembler::new(endpoint, chain, Arc::new(RiskAnalyzer::default()));
        LiveMonitor::new(
            assembler,
            &MonitorConfig {
                poll_interval_ms: POLL.as_millis() as u64,
                inclusion_retries: 2,
                ..MonitorConfig::default()
            },
        )
    }

    fn start(
        chain: Arc<MockChain>,
        address: Address,
    ) -> (WatchHandle, mpsc::UnboundedReceiver<TransactionRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = monitor(chain).watch(address, move |record| {
            let _ = tx.send(record);
        });
        (handle, rx)
    }

    fn watch_for(address: Address) -> (Watch, mpsc::UnboundedReceiver<TransactionRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: TransactionCallback = Arc::new(move |record| {
            let _ = tx.send(record);
        });
        (Watch::new(address, callback, CancellationToken::new()), rx)
    }

    fn pending(id: u64, from: Address, to: Address) -> PendingTx {
        PendingTx {
            hash: tx_hash(id),
            from,
            to: Some(to),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivers_only_matching_transactions() {
        let chain = Arc::new(MockChain::new());
        chain.add_tx(MockTx::new(1, addr(1), addr(2), ether(1), 10));
        let (handle, mut rx) = start(chain.clone(), addr(1));

        // let the watcher record the starting head
        tokio::time::sleep(Duration::from_millis(10)).await;
        chain.add_tx(MockTx::new(2, addr(3), addr(4), ether(1), 11));
        chain.add_tx(MockTx::new(3, addr(5), addr(1), ether(1), 11));

        let record = tokio::time::timeout(POLL * 3, rx.recv()).await.unwrap().unwrap();
        assert_eq!(record.hash, tx_hash(3));
        assert!(record.touches(addr(1)));

        // block 10 predates the watch and tx 2 is unrelated
        let more = tokio::time::timeout(POLL * 3, rx.recv()).await;
        assert!(!matches!(more, Ok(Some(_))));

        handle.cancel();
        handle.stopped().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrelated_block_transactions_are_never_assembled() {
        let chain = Arc::new(MockChain::new());
        chain.add_block(10);
        let (handle, mut rx) = start(chain.clone(), addr(1));
        tokio::time::sleep(Duration::from_millis(10)).await;

        for id in 100..120 {
            chain.add_tx(MockTx::new(id, addr(7), addr(8), ether(1), 11));
        }
        chain.add_tx(MockTx::new(1, addr(1), addr(2), ether(1), 11));

        let record = tokio::time::timeout(POLL * 3, rx.recv()).await.unwrap().unwrap();
        assert_eq!(record.hash, tx_hash(1));
        assert_eq!(chain.call_count(TRACE_TRANSACTION), 1);
        assert_eq!(chain.call_count(GET_TRANSACTION_COUNT), 1);

        handle.cancel();
        handle.stopped().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_assembly_failure_does_not_stop_feed() {
        let chain = Arc::new(MockChain::new());
        chain.add_block(10);
        let (handle, mut rx) = start(chain.clone(), addr(1));
        tokio::time::sleep(Duration::from_millis(10)).await;

        chain.add_tx(MockTx::new(1, addr(1), addr(2), ether(1), 11));
        chain.fail_tx(tx_hash(1));
        chain.add_tx(MockTx::new(2, addr(1), addr(2), ether(1), 12));

        let record = tokio::time::timeout(POLL * 3, rx.recv()).await.unwrap().unwrap();
        assert_eq!(record.hash, tx_hash(2));

        handle.cancel();
        handle.stopped().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_block_is_skipped() {
        let chain = Arc::new(MockChain::new());
        chain.add_block(10);
        let (handle, mut rx) = start(chain.clone(), addr(1));
        tokio::time::sleep(Duration::from_millis(10)).await;

        chain.add_tx(MockTx::new(1, addr(1), addr(2), ether(1), 11));
        chain.fail_block(11);
        chain.add_tx(MockTx::new(2, addr(2), addr(1), ether(1), 12));

        let record = tokio::time::timeout(POLL * 3, rx.recv()).await.unwrap().unwrap();
        assert_eq!(record.hash, tx_hash(2));

        handle.cancel();
        handle.stopped().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_callbacks_after_cancel() {
        let chain = Arc::new(MockChain::new());
        chain.add_block(10);
        let (handle, mut rx) = start(chain.clone(), addr(1));
        tokio::time::sleep(Duration::from_millis(10)).await;

        handle.cancel();
        assert!(handle.is_cancelled());
        chain.add_tx(MockTx::new(1, addr(1), addr(2), ether(1), 11));
        handle.stopped().await;

        let result = tokio::time::timeout(POLL * 3, rx.recv()).await;
        assert!(!matches!(result, Ok(Some(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_cancels_watch() {
        let chain = Arc::new(MockChain::new());
        chain.add_block(10);
        let (handle, _rx) = start(chain, addr(1));

        let token = handle.token.clone();
        drop(handle);
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_match_is_delivered_once_mined() {
        let chain = Arc::new(MockChain::new());
        chain.add_block(10);
        let monitor = monitor(chain.clone());
        let (watch, mut rx) = watch_for(addr(1));

        let feed = futures::stream::iter(vec![
            pending(1, addr(3), addr(4)),
            pending(2, addr(5), addr(1)),
        ]);
        monitor.follow_pending(feed, &watch).await;

        // both show up in a block after the feed saw them
        chain.add_tx(MockTx::new(1, addr(3), addr(4), ether(1), 11));
        chain.add_tx(MockTx::new(2, addr(5), addr(1), ether(1), 11));

        let record = tokio::time::timeout(POLL * 10, rx.recv()).await.unwrap().unwrap();
        assert_eq!(record.hash, tx_hash(2));
        assert_eq!(chain.call_count(GET_TRANSACTION_BY_HASH), 1);
        assert_eq!(chain.call_count(TRACE_TRANSACTION), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_match_never_mined_is_dropped() {
        let chain = Arc::new(MockChain::new());
        chain.add_block(10);
        let monitor = monitor(chain.clone());
        let (watch, mut rx) = watch_for(addr(1));

        let feed = futures::stream::iter(vec![pending(9, addr(1), addr(2))]);
        monitor.follow_pending(feed, &watch).await;

        let result = tokio::time::timeout(POLL * 30, rx.recv()).await;
        assert!(!matches!(result, Ok(Some(_))));
        // first poll plus two retries, then it gives up
        assert_eq!(chain.call_count(GET_TRANSACTION_RECEIPT), 3);
        assert_eq!(chain.call_count(GET_TRANSACTION_BY_HASH), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_wait_stops_on_cancel() {
        let chain = Arc::new(MockChain::new());
        chain.add_block(10);
        let monitor = monitor(chain.clone());
        let (watch, mut rx) = watch_for(addr(1));

        let feed = futures::stream::iter(vec![pending(4, addr(1), addr(2))]);
        monitor.follow_pending(feed, &watch).await;
        watch.shutdown.cancel();

        chain.add_tx(MockTx::new(4, addr(1), addr(2), ether(1), 11));
        let result = tokio::time::timeout(POLL * 10, rx.recv()).await;
        assert!(!matches!(result, Ok(Some(_))));
        assert_eq!(chain.call_count(GET_TRANSACTION_BY_HASH), 0);
    }
}

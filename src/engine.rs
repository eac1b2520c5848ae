use alloy::primitives::{Address, B256};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::chains::registry::ChainRegistry;
use crate::config::Config;
use crate::error::ChainError;
use crate::graph::cluster::{ClusterBuilder, ClusterResult};
use crate::history::fetcher::HistoryFetcher;
use crate::monitor::live::{LiveMonitor, WatchHandle};
use crate::risk::analyzer::RiskAnalyzer;
use crate::risk::watchlist::KnownRiskSet;
use crate::rpc::http::HttpRpcClient;
use crate::rpc::RpcClient;
use crate::tx::assembler::TransactionAssembler;
use crate::tx::types::TransactionRecord;

/// Per-chain component stack, all sharing one client and analyzer.
#[derive(Clone)]
struct ChainServices {
    assembler: TransactionAssembler,
    history: HistoryFetcher,
    cluster: ClusterBuilder,
    monitor: LiveMonitor,
}

/// History and cluster view of a single address.
#[derive(Debug, Clone, Serialize)]
pub struct AddressReport {
    pub address: Address,
    pub chain_id: String,
    pub known_risk_label: Option<String>,
    pub history: Vec<TransactionRecord>,
    pub flagged_transactions: usize,
    pub cluster: ClusterResult,
}

/// Entry point for every public operation. Constructed once by the host with
/// its registry and clients injected; holds no state between calls.
pub struct IntelEngine {
    registry: ChainRegistry,
    chains: HashMap<String, ChainServices>,
    known_risk: Arc<KnownRiskSet>,
    default_max_depth: u32,
}

impl IntelEngine {
    /// Build an engine talking HTTP JSON-RPC to every configured chain.
    pub fn from_config(config: &Config) -> eyre::Result<Self> {
        let registry = ChainRegistry::from_config(&config.chains);

        let mut clients: HashMap<String, Arc<dyn RpcClient>> = HashMap::new();
        for endpoint in registry.endpoints() {
            let client = HttpRpcClient::new(endpoint).map_err(|e| {
                eyre::eyre!("Failed to create RPC client for '{}': {}", endpoint.chain_id, e)
            })?;
            clients.insert(endpoint.chain_id.clone(), Arc::new(client));
        }

        let known_risk = match &config.risk.known_risk_path {
            Some(path) => KnownRiskSet::load_csv(path)?,
            None => KnownRiskSet::default(),
        };

        Self::with_clients(registry, clients, config, known_risk)
    }

    /// Build an engine over caller-supplied clients, one per registry entry.
    pub fn with_clients(
        registry: ChainRegistry,
        mut clients: HashMap<String, Arc<dyn RpcClient>>,
        config: &Config,
        known_risk: KnownRiskSet,
    ) -> eyre::Result<Self> {
        let analyzer = Arc::new(RiskAnalyzer::new(&config.risk)?);
        let known_risk = Arc::new(known_risk);

        let mut chains = HashMap::new();
        for endpoint in registry.endpoints() {
            let client = clients
                .remove(&endpoint.chain_id)
                .ok_or_else(|| eyre::eyre!("No RPC client supplied for chain '{}'", endpoint.chain_id))?;

            let assembler = TransactionAssembler::new(endpoint.clone(), client, analyzer.clone());
            let history = HistoryFetcher::new(assembler.clone(), config.history.clone());
            let cluster = ClusterBuilder::new(history.clone(), &config.cluster, known_risk.clone());
            let monitor = LiveMonitor::new(assembler.clone(), &config.monitor);

            chains.insert(
                endpoint.chain_id.clone(),
                ChainServices {
                    assembler,
                    history,
                    cluster,
                    monitor,
                },
            );
        }

        tracing::info!(
            chains = chains.len(),
            known_risk = known_risk.len(),
            "Intel engine ready"
        );

        Ok(Self {
            registry,
            chains,
            known_risk,
            default_max_depth: config.cluster.default_max_depth,
        })
    }

    pub fn default_max_depth(&self) -> u32 {
        self.default_max_depth
    }

    fn services(&self, chain_id: &str) -> Result<&ChainServices, ChainError> {
        self.registry.get(chain_id)?;
        self.chains
            .get(chain_id)
            .ok_or_else(|| ChainError::UnsupportedChain(chain_id.to_string()))
    }

    /// Reconstruct one transaction. Errors propagate unchanged.
    pub async fn assemble(&self, hash: B256, chain_id: &str) -> Result<TransactionRecord, ChainError> {
        self.services(chain_id)?.assembler.assemble(hash).await
    }

    /// Best-effort history; only an unknown chain is an error.
    pub async fn history(
        &self,
        address: Address,
        chain_id: &str,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, ChainError> {
        Ok(self.services(chain_id)?.history.history(address, limit).await)
    }

    pub async fn build_cluster(
        &self,
        seed: Address,
        chain_id: &str,
        max_depth: u32,
    ) -> Result<ClusterResult, ChainError> {
        Ok(self.services(chain_id)?.cluster.build(seed, max_depth).await)
    }

    /// Watch `address` on `chain_id` until the returned handle is cancelled.
    pub fn watch<F>(&self, address: Address, chain_id: &str, on_transaction: F) -> Result<WatchHandle, ChainError>
    where
        F: Fn(TransactionRecord) + Send + Sync + 'static,
    {
        Ok(self.services(chain_id)?.monitor.watch(address, on_transaction))
    }

    /// History plus cluster for one address, fetched concurrently.
    pub async fn analyze_address(
        &self,
        address: Address,
        chain_id: &str,
        limit: usize,
        max_depth: u32,
    ) -> Result<AddressReport, ChainError> {
        let services = self.services(chain_id)?;

        let (history, cluster) = tokio::join!(
            services.history.history(address, limit),
            services.cluster.build(address, max_depth),
        );

        let flagged_transactions = history
            .iter()
            .filter(|tx| !tx.risk_indicators.is_empty())
            .count();

        Ok(AddressReport {
            address,
            chain_id: chain_id.to_string(),
            known_risk_label: self.known_risk.label(&address).map(str::to_string),
            history,
            flagged_transactions,
            cluster,
        })
    }
}

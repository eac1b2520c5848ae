use alloy::primitives::{Address, U256};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use crate::config::ClusterConfig;
use crate::history::fetcher::HistoryFetcher;
use crate::risk::watchlist::KnownRiskSet;
use crate::units::native_to_wei;

/// Aggregated transfers for one ordered (from, to) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterConnection {
    pub from: Address,
    pub to: Address,
    pub frequency: u64,
    pub total_value_wei: U256,
}

/// Snapshot of one cluster exploration. Every connection endpoint is a member
/// of `addresses`, and `cluster_size == addresses.len()`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterResult {
    pub seed: Address,
    pub addresses: BTreeSet<Address>,
    pub connections: Vec<ClusterConnection>,
    pub risk_score: f64,
    pub cluster_size: usize,
}

#[derive(Debug, Default)]
struct AggregatedEdge {
    frequency: u64,
    total_value_wei: U256,
}

/// Breadth-first exploration of the transaction graph around a seed address.
#[derive(Clone)]
pub struct ClusterBuilder {
    history: HistoryFetcher,
    history_cap: usize,
    materiality_wei: U256,
    known_risk: Arc<KnownRiskSet>,
}

impl ClusterBuilder {
    pub fn new(history: HistoryFetcher, config: &ClusterConfig, known_risk: Arc<KnownRiskSet>) -> Self {
        Self {
            history,
            history_cap: config.history_cap,
            materiality_wei: native_to_wei(config.materiality_ether),
            known_risk,
        }
    }

    /// Explore up to `max_depth` hops from `seed`.
    ///
    /// Only transfers strictly above the materiality threshold pull a new
    /// address into the cluster. Each address is enqueued at most once, and
    /// one node's history is fully processed before the next is dequeued.
    pub async fn build(&self, seed: Address, max_depth: u32) -> ClusterResult {
        let mut visited: BTreeSet<Address> = BTreeSet::from([seed]);
        let mut queue: VecDeque<(Address, u32)> = VecDeque::from([(seed, 0)]);
        let mut edges: BTreeMap<(Address, Address), AggregatedEdge> = BTreeMap::new();
        let mut expanded = 0usize;

        while let Some((address, level)) = queue.pop_front() {
            if level >= max_depth {
                continue;
            }

            let transactions = self.history.history(address, self.history_cap).await;
            expanded += 1;

            for tx in &transactions {
                let Some(to) = tx.to else {
                    continue;
                };
                let other = if tx.from == address { to } else { tx.from };

                if !visited.contains(&other) && tx.value_wei > self.materiality_wei {
                    visited.insert(other);
                    if level + 1 < max_depth {
                        queue.push_back((other, level + 1));
                    }
                }

                // counted once per history it appears in, so a transfer between
                // two expanded addresses weighs twice
                let edge = edges.entry((tx.from, to)).or_default();
                edge.frequency += 1;
                edge.total_value_wei = edge.total_value_wei.saturating_add(tx.value_wei);
            }
        }

        let connections: Vec<ClusterConnection> = edges
            .into_iter()
            .filter(|((from, to), _)| visited.contains(from) && visited.contains(to))
            .map(|((from, to), edge)| ClusterConnection {
                from,
                to,
                frequency: edge.frequency,
                total_value_wei: edge.total_value_wei,
            })
            .collect();

        let known_risky = visited.iter().filter(|a| self.known_risk.contains(a)).count();
        let risk_score = cluster_risk_score(visited.len(), connections.len(), known_risky);

        tracing::info!(
            seed = %seed,
            max_depth,
            expanded,
            addresses = visited.len(),
            connections = connections.len(),
            known_risky,
            risk_score,
            "Cluster built"
        );

        ClusterResult {
            seed,
            cluster_size: visited.len(),
            addresses: visited,
            connections,
            risk_score,
        }
    }
}

/// Weighted cluster score in `[0, 1]`:
/// size (cap 0.3) + connection density (cap 0.3) + known-risk share (cap 0.4).
///
/// A lone seed has no size or density signal and scores only on known risk.
pub fn cluster_risk_score(size: usize, connections: usize, known_risky: usize) -> f64 {
    if size == 0 {
        return 0.0;
    }
    let size_f = size as f64;

    let known_factor = (known_risky as f64 / size_f).clamp(0.0, 1.0) * 0.4;
    if size == 1 {
        return known_factor.clamp(0.0, 1.0);
    }

    let size_factor = (size_f / 100.0).clamp(0.0, 1.0) * 0.3;
    let density = (2.0 * connections as f64 / size_f) / 10.0;
    let density_factor = density.clamp(0.0, 1.0) * 0.3;

    (size_factor + density_factor + known_factor).clamp(0.0, 1.0)
}

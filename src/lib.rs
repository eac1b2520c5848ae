pub mod chains;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod history;
pub mod monitor;
pub mod risk;
pub mod rpc;
pub mod tx;
pub mod units;

#[cfg(test)]
pub(crate) mod testing;

use alloy::primitives::{Address, B256};
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

use chainwatch_intel::config::Config;
use chainwatch_intel::engine::IntelEngine;

const USAGE: &str = "usage: chainwatch-intel [--config <path>] <command>

commands:
  tx <chain> <hash>
  history <chain> <address> [limit]
  cluster <chain> <address> [depth]
  report <chain> <address> [limit] [depth]
  watch <chain> <address>";

const DEFAULT_HISTORY_LIMIT: usize = 25;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    // Logs go to stderr so stdout stays machine-readable (set RUST_LOG to tune)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let config_path = match args.iter().position(|a| a == "--config") {
        Some(i) => {
            if i + 1 >= args.len() {
                return Err(eyre::eyre!("--config needs a path\n\n{}", USAGE));
            }
            let path = args.remove(i + 1);
            args.remove(i);
            path
        }
        None => "config.toml".to_string(),
    };

    let config = Config::load(&config_path)?;
    tracing::info!(
        chains = config.chains.len(),
        "Configuration loaded from {}",
        config_path
    );

    let engine = IntelEngine::from_config(&config)?;

    let command = args.first().map(String::as_str).unwrap_or("");
    match command {
        "tx" => {
            let chain = arg(&args, 1, "chain")?;
            let hash = parse_hash(arg(&args, 2, "hash")?)?;
            let record = engine.assemble(hash, chain).await?;
            print_json(&record)?;
        }
        "history" => {
            let chain = arg(&args, 1, "chain")?;
            let address = parse_address(arg(&args, 2, "address")?)?;
            let limit = optional_number(&args, 3, DEFAULT_HISTORY_LIMIT)?;
            let records = engine.history(address, chain, limit).await?;
            print_json(&records)?;
        }
        "cluster" => {
            let chain = arg(&args, 1, "chain")?;
            let address = parse_address(arg(&args, 2, "address")?)?;
            let depth = optional_number(&args, 3, engine.default_max_depth())?;
            let cluster = engine.build_cluster(address, chain, depth).await?;
            print_json(&cluster)?;
        }
        "report" => {
            let chain = arg(&args, 1, "chain")?;
            let address = parse_address(arg(&args, 2, "address")?)?;
            let limit = optional_number(&args, 3, DEFAULT_HISTORY_LIMIT)?;
            let depth = optional_number(&args, 4, engine.default_max_depth())?;
            let report = engine.analyze_address(address, chain, limit, depth).await?;
            print_json(&report)?;
        }
        "watch" => {
            let chain = arg(&args, 1, "chain")?;
            let address = parse_address(arg(&args, 2, "address")?)?;

            let handle = engine.watch(address, chain, |record| {
                match serde_json::to_string(&record) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::error!(tx = %record.hash, error = %e, "Failed to encode record"),
                }
            })?;

            tracing::info!(chain = %chain, address = %address, "Watching. Press Ctrl+C to stop.");
            tokio::signal::ctrl_c().await?;
            tracing::info!("Shutdown signal received, stopping watch...");
            handle.cancel();
            handle.stopped().await;
        }
        _ => return Err(eyre::eyre!("{}", USAGE)),
    }

    Ok(())
}

fn arg<'a>(args: &'a [String], index: usize, name: &str) -> eyre::Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| eyre::eyre!("missing <{}>\n\n{}", name, USAGE))
}

fn optional_number<T: FromStr>(args: &[String], index: usize, default: T) -> eyre::Result<T>
where
    T::Err: std::fmt::Display,
{
    match args.get(index) {
        Some(raw) => raw
            .parse()
            .map_err(|e| eyre::eyre!("Invalid number '{}': {}", raw, e)),
        None => Ok(default),
    }
}

fn parse_address(raw: &str) -> eyre::Result<Address> {
    Address::from_str(raw).map_err(|e| eyre::eyre!("Invalid address '{}': {}", raw, e))
}

fn parse_hash(raw: &str) -> eyre::Result<B256> {
    B256::from_str(raw).map_err(|e| eyre::eyre!("Invalid transaction hash '{}': {}", raw, e))
}

fn print_json<T: serde::Serialize>(value: &T) -> eyre::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

//! Federated-Learning Registry Node
//!
//! Main entry point for the registry authority. Replays the event
//! journal into an in-memory registry, seeds the genesis committee on
//! first start, and serves the JSON-RPC gateway. State survives
//! restarts through the journal.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use fl_gateway::{GatewayContext, HttpGateway};
use fl_registry::{EventStore, JournalMetadata, MemberId, Registry};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

use config::NodeConfig;

/// Patient federated-learning registry node
#[derive(Parser, Debug)]
#[command(name = "fl-node")]
#[command(about = "Consent, round, and committee authority for federated learning", long_about = None)]
struct Args {
    /// HTTP gateway bind address
    #[arg(long, default_value = "127.0.0.1:8700")]
    rpc_addr: String,

    /// Data directory for the event journal
    #[arg(long, default_value = "./data")]
    data_dir: std::path::PathBuf,

    /// Genesis committee member (base58 verifying key, repeatable)
    #[arg(long = "genesis-member")]
    genesis_members: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> NodeConfig {
        NodeConfig {
            rpc_addr: self.rpc_addr,
            data_dir: self.data_dir,
            genesis_members: self.genesis_members,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    run_node(args.into_config()).await
}

async fn run_node(config: NodeConfig) -> Result<()> {
    tracing::info!("Starting federated-learning registry node");
    tracing::info!("  HTTP gateway: {}", config.rpc_addr);
    tracing::info!("  Data directory: {:?}", config.data_dir);

    // Create data directory if it doesn't exist
    std::fs::create_dir_all(&config.data_dir)?;

    // Open the event journal
    let journal = Arc::new(EventStore::open(&config.data_dir)?);
    if let Some(metadata) = journal.load_metadata()? {
        tracing::info!(
            "Journal last saved at {} ({} events)",
            metadata.last_save_ts,
            metadata.event_count
        );
    }
    let registry = Arc::new(Registry::with_journal(journal.clone()));

    // Rebuild state from the journal, or seed the genesis committee on
    // an empty store
    if journal.is_empty() {
        let genesis = parse_members(&config.genesis_members)?;
        if genesis.is_empty() {
            tracing::warn!(
                "No genesis committee members configured; rounds cannot be opened"
            );
        } else {
            registry
                .bootstrap_committee(&genesis)
                .map_err(|e| anyhow::anyhow!("committee bootstrap failed: {e}"))?;
        }
    } else {
        let replayed = registry.replay_journal()?;
        tracing::info!(
            "Restored state: {} events, {} committee members",
            replayed,
            registry.member_count()
        );
    }

    // Start the HTTP gateway
    let context = Arc::new(GatewayContext {
        registry: registry.clone(),
    });
    let rpc_addr = config.rpc_addr.clone();
    let gateway = tokio::spawn(async move {
        let server = HttpGateway::new(context);
        if let Err(e) = server.run(&rpc_addr).await {
            tracing::error!("HTTP gateway error: {}", e);
        }
    });

    tracing::info!("Registry node running. Press Ctrl+C to stop.");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down...");

    // Persist journal metadata and flush before exit
    let metadata = JournalMetadata {
        event_count: journal.len(),
        last_event_ts: journal
            .events()
            .ok()
            .and_then(|events| events.last().map(|e| e.ts()))
            .unwrap_or(0),
        last_save_ts: chrono::Utc::now().timestamp(),
    };
    if let Err(e) = journal.save_metadata(&metadata) {
        tracing::error!("Failed to save journal metadata: {}", e);
    }
    if let Err(e) = journal.flush() {
        tracing::error!("Failed to flush journal: {}", e);
    } else {
        tracing::info!("Journal flushed: {} events", journal.len());
    }

    gateway.abort();

    tracing::info!("Registry node stopped");

    Ok(())
}

fn parse_members(keys: &[String]) -> Result<Vec<MemberId>> {
    keys.iter()
        .map(|key| {
            MemberId::from_str(key)
                .map_err(|e| anyhow::anyhow!("invalid genesis member {key}: {e}"))
        })
        .collect()
}

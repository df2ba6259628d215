// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Accountant Node
//!
//! Entry point for the `accountant-node` binary. Parses CLI arguments,
//! loads the TOML config, initializes logging and metrics, and dispatches
//! to a subcommand:
//!
//! - `init`     - create a data directory with a signing key and a store
//! - `simulate` - replicate ledgers across an in-process gossip cluster
//! - `audit`    - re-validate and replay an on-disk store
//! - `version`  - print build version information

mod cli;
mod config;
mod logging;
mod metrics;
mod simulate;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use tokio::signal;
use tokio::sync::watch;

use accountant_protocol::crypto::{Ed25519Signer, Ed25519Verifier, Keypair, Signer};
use accountant_protocol::ledger::AccountingBook;
use accountant_protocol::storage::LedgerDB;

use cli::{AccountantCli, Commands};
use config::NodeConfig;
use logging::LogFormat;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = AccountantCli::parse();

    let data_dir = match &cli.command {
        Commands::Init(args) => Some(args.data_dir.as_path()),
        Commands::Audit(args) => Some(args.data_dir.as_path()),
        Commands::Simulate(_) => None,
        Commands::Version => {
            print_version();
            return Ok(());
        }
    };
    let config = NodeConfig::load(cli.config.as_deref(), data_dir)?;

    let format = cli.log_format.as_deref().unwrap_or(&config.log_format);
    logging::init_logging(&config.log_level, LogFormat::parse(format)?)?;

    match cli.command {
        Commands::Init(args) => init_node(config, args),
        Commands::Simulate(args) => run_simulation(config, args).await,
        Commands::Audit(_) => audit_store(config).await,
        Commands::Version => Ok(()),
    }
}

/// Creates the data directory, the signing key, the config file and the
/// vertex store. Optionally mints genesis.
fn init_node(config: NodeConfig, args: cli::InitArgs) -> Result<()> {
    let data_dir = &config.data_dir;
    tracing::info!(data_dir = %data_dir.display(), "initializing node");

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let key_path = config.key_path();
    if key_path.exists() && !args.force {
        bail!(
            "{} already exists, pass --force to replace it",
            key_path.display()
        );
    }
    let keypair = Keypair::generate();
    std::fs::write(&key_path, keypair.to_hex())
        .with_context(|| format!("failed to write node key to {}", key_path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600))?;
    }

    let config_path = data_dir.join(config::CONFIG_FILE_NAME);
    if !config_path.exists() {
        std::fs::write(&config_path, config.to_toml_string()?)
            .with_context(|| format!("failed to write {}", config_path.display()))?;
    }

    let signer = Arc::new(Ed25519Signer::new(keypair));
    let address = signer.address();
    let book = open_book(&config.db_path(), signer.clone())?;

    if let Some(amount) = args.genesis {
        let mint = simulate::signed_transfer(&signer, &signer, amount)?;
        let genesis = book.genesis(mint).context("failed to mint genesis")?;
        tracing::info!(genesis = %genesis.hash, amount, "genesis minted");
    }
    book.flush()?;

    println!("Node initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Node key       : {}", key_path.display());
    println!("  Address        : {}", address);
    println!("  Vertices       : {}", book.vertex_count());

    Ok(())
}

async fn run_simulation(mut config: NodeConfig, args: cli::SimulateArgs) -> Result<()> {
    if let Some(nodes) = args.nodes {
        config.simulation.nodes = nodes;
    }
    if let Some(rounds) = args.rounds {
        config.simulation.rounds = rounds;
    }
    if let Some(transfer) = args.transfer {
        config.simulation.transfer_amount = transfer;
    }

    let metrics = NodeMetrics::new()?;
    let report = tokio::select! {
        report = simulate::run(&config.simulation, &config.gossip, &metrics) => report?,
        _ = shutdown_signal() => bail!("simulation interrupted"),
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    if args.metrics {
        print!("{}", metrics.encode()?);
    }
    if !report.is_healthy() {
        bail!("cluster did not converge");
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct AuditOutput {
    address: String,
    vertices: usize,
    genesis: Option<String>,
    checked: usize,
    invalid: Vec<(String, String)>,
    replayed: usize,
    skipped: Vec<String>,
    balances_match_replay: bool,
    balances: BTreeMap<String, String>,
}

/// Opens an existing store read-mostly, audits every vertex and checks
/// the live balances against a fresh replay. Ctrl+C cancels.
async fn audit_store(config: NodeConfig) -> Result<()> {
    let key_path = config.key_path();
    let key = std::fs::read_to_string(&key_path)
        .with_context(|| format!("failed to read node key {}", key_path.display()))?;
    let signer = Arc::new(Ed25519Signer::new(Keypair::from_hex(&key)?));
    let book = Arc::new(open_book(&config.db_path(), signer)?);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = cancel_tx.send(true);
    });

    let worker = book.clone();
    let output = tokio::task::spawn_blocking(move || -> Result<AuditOutput> {
        let audit = worker.audit(Some(&cancel_rx))?;
        let replay = worker.replay(Some(&cancel_rx))?;
        let balances = worker.balances();
        Ok(AuditOutput {
            address: worker.address().to_string(),
            vertices: worker.vertex_count(),
            genesis: worker.genesis_hash()?.map(|hash| hash.to_string()),
            checked: audit.checked,
            invalid: audit
                .invalid
                .iter()
                .map(|(hash, reason)| (hash.to_string(), reason.clone()))
                .collect(),
            replayed: replay.order.len(),
            skipped: replay.skipped.iter().map(ToString::to_string).collect(),
            balances_match_replay: replay.ledger.amounts() == balances,
            balances: balances
                .iter()
                .map(|(address, amount)| (address.to_string(), amount.to_string()))
                .collect(),
        })
    })
    .await
    .context("audit task panicked")??;

    println!("{}", serde_json::to_string_pretty(&output)?);
    if !output.invalid.is_empty() || !output.balances_match_replay {
        bail!("store failed audit");
    }
    Ok(())
}

fn open_book(db_path: &Path, signer: Arc<Ed25519Signer>) -> Result<AccountingBook> {
    std::fs::create_dir_all(db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;
    let db = LedgerDB::open(db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "database opened");
    Ok(AccountingBook::open(db, signer, Arc::new(Ed25519Verifier))?)
}

/// Prints version information to stdout.
fn print_version() {
    println!("accountant-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol        {}", accountant_protocol::config::PROTOCOL_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

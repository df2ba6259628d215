//! # CLI Interface
//!
//! Defines the command-line argument structure for `accountant-node` using
//! `clap` derive. Four subcommands: `init`, `simulate`, `audit` and
//! `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Accountant ledger node.
///
/// Keeps a DAG of dual-signed transactions with derived balances and
/// replicates it to peers by epidemic gossip.
#[derive(Parser, Debug)]
#[command(
    name = "accountant-node",
    about = "Accountant DAG ledger node",
    version,
    propagate_version = true
)]
pub struct AccountantCli {
    /// Path to the node configuration file (TOML).
    ///
    /// When omitted, the node looks for `config.toml` in the data directory.
    #[arg(long, short = 'c', env = "ACCOUNTANT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log format override: "pretty" or "json".
    #[arg(long, env = "ACCOUNTANT_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a data directory: signing key, config file, empty store.
    Init(InitArgs),
    /// Run an in-process cluster, replicate ledgers over gossip and report
    /// convergence.
    Simulate(SimulateArgs),
    /// Re-validate and replay an on-disk vertex store.
    Audit(AuditArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "ACCOUNTANT_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Mint a genesis vertex of this many whole units to the node's own
    /// address.
    #[arg(long)]
    pub genesis: Option<u64>,

    /// Overwrite an existing key file.
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// Number of fully connected nodes.
    #[arg(long, short = 'n')]
    pub nodes: Option<usize>,

    /// Transfer rounds after the initial distribution.
    #[arg(long, short = 'r')]
    pub rounds: Option<usize>,

    /// Whole units each node sends to its neighbour per round.
    #[arg(long)]
    pub transfer: Option<u64>,

    /// Print the Prometheus text dump after the report.
    #[arg(long)]
    pub metrics: bool,
}

#[derive(Parser, Debug)]
pub struct AuditArgs {
    /// Data directory holding the store to audit.
    #[arg(long, short = 'd', env = "ACCOUNTANT_DATA_DIR")]
    pub data_dir: PathBuf,
}

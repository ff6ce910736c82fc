use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use rally_log::Format;
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "rally",
    about = "Operate the Rally resilience layer",
    version = env!("CARGO_PKG_VERSION"),
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// TOML file layered over the built-in presets
    #[arg(short, long, global = true, env = "RALLY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. "info" or "rally_resilience=debug"
    #[arg(long, global = true, env = "RALLY_LOG", default_value = "warn")]
    pub log_level: String,

    /// Log output format
    #[arg(long, global = true, env = "RALLY_LOG_FORMAT", default_value = "compact")]
    pub log_format: Format,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect the effective configuration
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Run payments against simulated gateways
    Drill(DrillArgs),

    /// Inspect and drain the manual escalation queue
    #[command(subcommand)]
    Queue(QueueCommands),
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate the configuration and summarize it
    Check,

    /// Print the effective configuration as JSON
    Show,
}

#[derive(Args)]
pub struct DrillArgs {
    /// Payment method to charge
    #[arg(short, long, default_value = "card")]
    pub method: String,

    /// Amount in minor currency units
    #[arg(short, long, default_value_t = 10_000)]
    pub amount: u64,

    /// Number of payments to send
    #[arg(short = 'n', long, default_value_t = 1)]
    pub count: u32,

    /// Member charged; defaults to a distinct member per payment
    #[arg(long)]
    pub actor: Option<String>,

    /// Gateway that fails every charge (repeatable)
    #[arg(long = "fail-gateway", value_name = "GATEWAY")]
    pub fail_gateways: Vec<String>,

    /// Persist queued payments to this JSON-lines file
    #[arg(long)]
    pub queue_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// Show backlog length, amount and age
    Status(QueueFile),

    /// List pending items, oldest first
    List(QueueFile),

    /// Mark an item as processed
    Ack {
        #[command(flatten)]
        file: QueueFile,

        /// Item id
        id: Uuid,
    },
}

#[derive(Args)]
pub struct QueueFile {
    /// JSON-lines queue file
    #[arg(long, env = "RALLY_QUEUE_FILE")]
    pub file: PathBuf,
}

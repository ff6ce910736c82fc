//! `rally` - operator tool for the Rally resilience layer
//!
//! ```text
//! rally config check --config rally.toml
//! rally drill --method card --count 12 --fail-gateway stripe
//! rally queue list --file /var/lib/rally/manual_queue.jsonl
//! ```

mod cli;
mod commands;
mod gateway;
mod settings;

use std::io::IsTerminal;

use clap::Parser;
use rally_resilience::FileQueue;

use crate::cli::{Cli, Commands, ConfigCommands, QueueCommands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log = rally_log::Config {
        level: cli.log_level.clone(),
        format: cli.log_format,
        display: rally_log::DisplayConfig {
            colors: cli.log_format != rally_log::Format::Json && std::io::stderr().is_terminal(),
            ..rally_log::DisplayConfig::default()
        },
    };
    rally_log::init_with(log)?;

    match cli.command {
        Commands::Config(command) => {
            let config = settings::load(cli.config.as_deref())?;
            match command {
                ConfigCommands::Check => commands::config::check(&config),
                ConfigCommands::Show => commands::config::show(&config),
            }
        }
        Commands::Drill(args) => {
            let config = settings::load(cli.config.as_deref())?;
            commands::drill::run(config, args).await
        }
        Commands::Queue(command) => match command {
            QueueCommands::Status(file) => commands::queue::status(&FileQueue::new(file.file)).await,
            QueueCommands::List(file) => commands::queue::list(&FileQueue::new(file.file)).await,
            QueueCommands::Ack { file, id } => {
                commands::queue::ack(&FileQueue::new(file.file), id).await
            }
        },
    }
}

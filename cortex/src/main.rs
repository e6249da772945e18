// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Cortex CLI
//!
//! The `cortex` binary inspects configuration and exercises the memory and
//! learning core against the in-memory stack.
//!
//! ## Commands
//!
//! - `cortex config show|validate` - Configuration management
//! - `cortex simulate --turns N --seed S` - Synthetic agent turns plus one learning cycle

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};

mod commands;

use commands::{ConfigCommand, SimulateArgs};

/// Memory and learning core for a trading-signal agent
#[derive(Parser)]
#[command(name = "cortex")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "CORTEX_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "CORTEX_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (compact, json)
    #[arg(long, global = true, env = "CORTEX_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Run synthetic agent turns and one learning cycle
    #[command(name = "simulate")]
    Simulate(SimulateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = signal_cortex::CortexConfig::load_or_default(cli.config.clone())
        .unwrap_or_default();
    let level = cli.log_level.as_deref().unwrap_or(&config.telemetry.level);
    let format = cli.log_format.as_deref().unwrap_or(&config.telemetry.format);
    signal_cortex::telemetry::init_logging(level, format)?;

    match cli.command {
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config).await,
        Some(Commands::Simulate(args)) => commands::simulate::run(args, cli.config).await,
        None => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # svcforge
//!
//! Command line front end for the service reconciliation engine.
//!
//! ## Commands
//!
//! - `svcforge service deploy|remove|teardown` - Reconcile a service manifest
//! - `svcforge tags deploy|remove` - Manage service tags
//! - `svcforge registry namespace|login` - Container registry helpers
//! - `svcforge config show|validate|generate` - Configuration management
//!
//! Credentials may reference environment variables (`env:NAME`); a `.env`
//! file in the working directory is loaded first.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use svcforge::commands::{self, ConfigCommand, RegistryCommand, ServiceCommand, TagsCommand};

/// svcforge - Reconcile serverless function services
#[derive(Parser)]
#[command(name = "svcforge")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "SVCFORGE_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        global = true,
        env = "SVCFORGE_LOG_LEVEL",
        default_value = "info"
    )]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy and remove services
    #[command(name = "service")]
    Service {
        #[command(subcommand)]
        command: ServiceCommand,
    },

    /// Service tag management
    #[command(name = "tags")]
    Tags {
        #[command(subcommand)]
        command: TagsCommand,
    },

    /// Container registry helpers
    #[command(name = "registry")]
    Registry {
        #[command(subcommand)]
        command: RegistryCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Commands::Service { command }) => {
            commands::service::handle_command(command, cli.config).await
        }
        Some(Commands::Tags { command }) => {
            commands::tags::handle_command(command, cli.config).await
        }
        Some(Commands::Registry { command }) => {
            commands::registry::handle_command(command, cli.config).await
        }
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}

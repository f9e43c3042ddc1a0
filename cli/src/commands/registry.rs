// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Container registry commands for custom-container services

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use crate::context::CommandContext;

#[derive(Subcommand)]
pub enum RegistryCommand {
    /// Make sure a registry namespace exists
    Namespace {
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Print temporary registry credentials
    Login {
        /// Emit credentials as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_command(
    command: RegistryCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    let context = CommandContext::load(config_override)?;
    let registry = context.registry();

    match command {
        RegistryCommand::Namespace { name } => {
            registry
                .ensure_namespace(&name)
                .await
                .with_context(|| format!("Failed to ensure namespace {}", name))?;
            println!("{}", format!("✓ Namespace {} is ready", name).green());
        }
        RegistryCommand::Login { json } => {
            let credentials = registry
                .authorization()
                .await
                .context("Failed to get registry credentials")?;
            if json {
                let body = serde_json::json!({
                    "user": credentials.user,
                    "password": credentials.password,
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                println!("User: {}", credentials.user);
                println!("Password: {}", credentials.password);
            }
        }
    }

    Ok(())
}

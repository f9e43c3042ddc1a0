// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Service tag commands
//!
//! Commands: deploy, remove

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use crate::commands::service::load_manifest;
use crate::context::CommandContext;

#[derive(Subcommand)]
pub enum TagsCommand {
    /// Apply the manifest's tags to its service
    Deploy {
        /// Service manifest (YAML)
        #[arg(value_name = "MANIFEST")]
        manifest: PathBuf,

        /// Only apply the tag with this key
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Remove tags from a service
    Remove {
        /// Service manifest (YAML)
        #[arg(value_name = "MANIFEST")]
        manifest: PathBuf,

        /// Only remove the tag with this key (default: all tags)
        #[arg(short, long)]
        key: Option<String>,
    },
}

pub async fn handle_command(command: TagsCommand, config_override: Option<PathBuf>) -> Result<()> {
    let context = CommandContext::load(config_override)?;

    match command {
        TagsCommand::Deploy { manifest, name } => {
            deploy(&context, &manifest, name.as_deref()).await
        }
        TagsCommand::Remove { manifest, key } => remove(&context, &manifest, key.as_deref()).await,
    }
}

async fn deploy(context: &CommandContext, path: &Path, name: Option<&str>) -> Result<()> {
    let manifest = load_manifest(path)?;
    let arn = context.deployer.service_arn(&manifest.service_name);

    let applied = context
        .deployer
        .tags()
        .deploy(&arn, &manifest.tags, name)
        .await
        .with_context(|| format!("Failed to tag service {}", manifest.service_name))?;

    if applied.is_empty() {
        println!("{}", "No tags to apply".dimmed());
        return Ok(());
    }
    println!("{}", format!("✓ Tagged {}", arn).green());
    for (key, value) in &applied {
        println!("  {} = {}", key.bold(), value);
    }
    Ok(())
}

async fn remove(context: &CommandContext, path: &Path, key: Option<&str>) -> Result<()> {
    let manifest = load_manifest(path)?;
    let arn = context.deployer.service_arn(&manifest.service_name);

    let removed = context
        .deployer
        .tags()
        .remove(&arn, key)
        .await
        .with_context(|| format!("Failed to untag service {}", manifest.service_name))?;

    if removed.is_empty() {
        println!("{}", "No tags to remove".dimmed());
    } else {
        let message = format!("✓ Removed {} tag(s) from {}", removed.len(), arn);
        println!("{}", message.green());
    }
    Ok(())
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Service reconciliation commands
//!
//! Commands: deploy, remove, teardown

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use svcforge_core::domain::service::ServiceManifest;

use crate::context::CommandContext;

#[derive(Subcommand)]
pub enum ServiceCommand {
    /// Create or update the service described by a manifest
    Deploy {
        /// Service manifest (YAML)
        #[arg(value_name = "MANIFEST")]
        manifest: PathBuf,

        /// Skip applying the manifest's tags
        #[arg(long)]
        no_tags: bool,
    },

    /// Delete a service
    Remove {
        /// Service manifest (YAML)
        #[arg(value_name = "MANIFEST")]
        manifest: PathBuf,

        /// Also remove auto-generated network, file system and log resources
        #[arg(long)]
        auto_generated: bool,
    },

    /// Remove only the auto-generated resources of a service
    Teardown {
        /// Service manifest (YAML)
        #[arg(value_name = "MANIFEST")]
        manifest: PathBuf,
    },
}

pub async fn handle_command(
    command: ServiceCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    let context = CommandContext::load(config_override)?;

    match command {
        ServiceCommand::Deploy { manifest, no_tags } => deploy(&context, &manifest, no_tags).await,
        ServiceCommand::Remove {
            manifest,
            auto_generated,
        } => remove(&context, &manifest, auto_generated).await,
        ServiceCommand::Teardown { manifest } => teardown(&context, &manifest).await,
    }
}

pub(crate) fn load_manifest(path: &Path) -> Result<ServiceManifest> {
    ServiceManifest::from_yaml_file(path)
        .with_context(|| format!("Failed to load service manifest {:?}", path))
}

async fn deploy(context: &CommandContext, path: &Path, no_tags: bool) -> Result<()> {
    let mut manifest = load_manifest(path)?;
    if no_tags {
        manifest.tags.clear();
    }

    let name = context
        .deployer
        .deploy_manifest(&manifest)
        .await
        .with_context(|| format!("Failed to deploy service {}", manifest.service_name))?;

    println!("{}", format!("✓ Service {} deployed", name).green());
    Ok(())
}

async fn remove(context: &CommandContext, path: &Path, auto_generated: bool) -> Result<()> {
    let manifest = load_manifest(path)?;

    context
        .deployer
        .remove(&manifest.service_name)
        .await
        .with_context(|| format!("Failed to remove service {}", manifest.service_name))?;
    println!(
        "{}",
        format!("✓ Service {} removed", manifest.service_name).green()
    );

    if auto_generated {
        teardown_manifest(context, &manifest).await;
    }
    Ok(())
}

async fn teardown(context: &CommandContext, path: &Path) -> Result<()> {
    let manifest = load_manifest(path)?;
    teardown_manifest(context, &manifest).await;
    Ok(())
}

async fn teardown_manifest(context: &CommandContext, manifest: &ServiceManifest) {
    let report = context
        .deployer
        .remove_auto_generated_resources(&manifest.service_name, &manifest.properties)
        .await;

    if report.is_clean() {
        println!("{}", "✓ Auto-generated resources removed".green());
        return;
    }

    println!(
        "{}",
        format!(
            "⚠ {} auto-generated resource(s) could not be removed:",
            report.failures.len()
        )
        .yellow()
    );
    for failure in &report.failures {
        println!("  - {}", failure);
    }
}

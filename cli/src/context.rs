// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Wiring from a loaded configuration to the core services.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::debug;

use svcforge_core::application::{RegistryService, ServiceDeployer};
use svcforge_core::domain::deploy_config::DeployConfig;
use svcforge_core::domain::platform::PlatformClients;
use svcforge_core::infrastructure::create_client_factory;

/// Everything a command needs to talk to the platform.
pub struct CommandContext {
    pub config: DeployConfig,
    pub clients: PlatformClients,
    pub deployer: ServiceDeployer,
}

impl CommandContext {
    pub fn load(config_override: Option<PathBuf>) -> Result<Self> {
        let config = DeployConfig::load_or_default(config_override)
            .context("Failed to load configuration")?;
        Self::from_config(config)
    }

    pub fn from_config(config: DeployConfig) -> Result<Self> {
        config
            .validate()
            .context("Configuration validation failed")?;

        let credentials = config
            .spec
            .credentials
            .resolve()
            .context("Failed to resolve credentials")?;

        debug!(
            "Building {:?} clients for region {}",
            config.spec.backend, config.spec.region
        );
        let clients = create_client_factory(config.spec.backend)
            .build(&credentials, &config.spec.region)
            .context("Failed to build platform clients")?;

        let deployer = ServiceDeployer::new(clients.clone(), credentials, &config.spec);

        Ok(Self {
            config,
            clients,
            deployer,
        })
    }

    pub fn registry(&self) -> RegistryService {
        RegistryService::new(self.clients.registry.clone())
    }
}

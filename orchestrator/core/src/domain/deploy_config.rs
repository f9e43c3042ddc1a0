// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Deploy Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) describing where
// and how services are reconciled:
// - Target region and account credentials
// - Retry policy for transient platform errors
// - Eventual-consistency budget for freshly provisioned log destinations
// - Helper function settings for nas directory enforcement
// - Platform backend selection

use crate::domain::platform::Credentials;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "svcforge.io/v1";
pub const KIND: &str = "DeployConfig";
pub const CONFIG_PATH_ENV: &str = "SVCFORGE_CONFIG_PATH";

/// Top-level deploy configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// API version (must be "svcforge.io/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "DeployConfig")
    pub kind: String,

    pub metadata: ConfigMetadata,

    pub spec: DeployConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfigSpec {
    /// Region every service is reconciled in (e.g. "cn-hangzhou")
    pub region: String,

    #[serde(default)]
    pub credentials: CredentialsConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub log_propagation: LogPropagationConfig,

    #[serde(default)]
    pub helper: HelperConfig,

    #[serde(default)]
    pub backend: BackendKind,
}

/// Credential values; each supports "env:VAR_NAME" indirection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub access_key_secret: String,
    #[serde(default)]
    pub account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_token: Option<String>,
}

/// Backoff for transient platform errors on reads and writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_min_delay", with = "humantime_serde")]
    pub min_delay: Duration,

    #[serde(default = "default_factor")]
    pub factor: u32,

    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,
}

/// Fixed retry budget for writes referencing a log destination that is not yet visible.
///
/// The defaults, 12 attempts spaced 3s apart, are the contracted behaviour: a
/// write naming a freshly created project or logstore is tried exactly 12
/// times before `LogDestinationNotReady` is returned. Lower them only in tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogPropagationConfig {
    /// Total write attempts, not retries (default 12)
    #[serde(default = "default_log_attempts")]
    pub attempts: u32,

    /// Pause between attempts (default 3s)
    #[serde(default = "default_log_delay", with = "humantime_serde")]
    pub delay: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelperConfig {
    #[serde(default = "default_helper_service")]
    pub service_name: String,

    #[serde(default = "default_helper_function")]
    pub function_name: String,

    #[serde(default = "default_helper_runtime")]
    pub runtime: String,

    #[serde(default = "default_helper_handler")]
    pub handler: String,

    #[serde(default = "default_helper_timeout")]
    pub timeout_secs: u32,

    #[serde(default = "default_helper_memory")]
    pub memory_mb: u32,

    /// Pause between deploying the helper and invoking it
    #[serde(default = "default_invoke_delay", with = "humantime_serde")]
    pub invoke_delay: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-memory platform, nothing leaves the process
    #[default]
    Sandbox,
}

// Default value functions
fn default_max_retries() -> u32 {
    10
}

fn default_min_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_factor() -> u32 {
    2
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_log_attempts() -> u32 {
    12
}

fn default_log_delay() -> Duration {
    Duration::from_secs(3)
}

fn default_helper_service() -> String {
    "fc-generated-default-service".to_string()
}

fn default_helper_function() -> String {
    "nas_dir_checker".to_string()
}

fn default_helper_runtime() -> String {
    "nodejs12".to_string()
}

fn default_helper_handler() -> String {
    "index.handler".to_string()
}

fn default_helper_timeout() -> u32 {
    60
}

fn default_helper_memory() -> u32 {
    128
}

fn default_invoke_delay() -> Duration {
    Duration::from_secs(1)
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            min_delay: default_min_delay(),
            factor: default_factor(),
            max_delay: default_max_delay(),
        }
    }
}

impl Default for LogPropagationConfig {
    fn default() -> Self {
        Self {
            attempts: default_log_attempts(),
            delay: default_log_delay(),
        }
    }
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            service_name: default_helper_service(),
            function_name: default_helper_function(),
            runtime: default_helper_runtime(),
            handler: default_helper_handler(),
            timeout_secs: default_helper_timeout(),
            memory_mb: default_helper_memory(),
            invoke_delay: default_invoke_delay(),
        }
    }
}

impl Default for DeployConfigSpec {
    fn default() -> Self {
        Self {
            region: "cn-hangzhou".to_string(),
            credentials: CredentialsConfig::default(),
            retry: RetryConfig::default(),
            log_propagation: LogPropagationConfig::default(),
            helper: HelperConfig::default(),
            backend: BackendKind::default(),
        }
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ConfigMetadata {
                name: "default".to_string(),
            },
            spec: DeployConfigSpec::default(),
        }
    }
}

impl CredentialsConfig {
    /// Resolve "env:VAR_NAME" indirections into concrete credentials.
    pub fn resolve(&self) -> anyhow::Result<Credentials> {
        let security_token = self.security_token.as_deref().map(resolve_value);
        Ok(Credentials {
            access_key_id: resolve_value(&self.access_key_id)?,
            access_key_secret: resolve_value(&self.access_key_secret)?,
            account_id: resolve_value(&self.account_id)?,
            security_token: security_token.transpose()?,
        })
    }
}

fn resolve_value(raw: &str) -> anyhow::Result<String> {
    match raw.strip_prefix("env:") {
        Some(var_name) => std::env::var(var_name)
            .map_err(|_| anyhow::anyhow!("Environment variable not set: {}", var_name)),
        None => Ok(raw.to_string()),
    }
}

impl DeployConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. SVCFORGE_CONFIG_PATH environment variable
    /// 2. ./svcforge-config.yaml (working directory)
    /// 3. ~/.svcforge/config.yaml (user home)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./svcforge-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".svcforge").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            return Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e));
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!(
                "Loading configuration from discovered path: {:?}",
                config_path
            );
            Self::from_yaml_file(config_path)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.spec.region.is_empty() {
            anyhow::bail!("spec.region cannot be empty");
        }

        if self.spec.retry.factor < 1 {
            anyhow::bail!("spec.retry.factor must be at least 1");
        }

        if self.spec.log_propagation.attempts < 1 {
            anyhow::bail!("spec.log_propagation.attempts must be at least 1");
        }

        if self.spec.helper.service_name.is_empty() || self.spec.helper.function_name.is_empty() {
            anyhow::bail!("spec.helper.service_name and spec.helper.function_name cannot be empty");
        }

        Ok(())
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Container registry namespaces and pull credentials for custom-container services.

use crate::domain::errors::ReconcileError;
use crate::domain::platform::{PlatformError, RegistryClient, RegistryCredentials};
use std::sync::Arc;
use tracing::info;

pub struct RegistryService {
    registry: Arc<dyn RegistryClient>,
}

impl RegistryService {
    pub fn new(registry: Arc<dyn RegistryClient>) -> Self {
        Self { registry }
    }

    pub async fn ensure_namespace(&self, namespace: &str) -> Result<(), ReconcileError> {
        let exists = self
            .registry
            .namespace_exists(namespace)
            .await
            .map_err(|e| {
                let operation = format!("Look up namespace {}", namespace);
                ReconcileError::provisioning(operation, e)
            })?;
        if exists {
            info!("Namespace {} exists", namespace);
            return Ok(());
        }

        let operation = format!("Create namespace {}", namespace);
        match self.registry.create_namespace(namespace).await {
            Ok(Some(namespace_id)) => {
                info!("Created namespace {} ({})", namespace, namespace_id);
                Ok(())
            }
            Ok(None) => Err(ReconcileError::provisioning(
                operation,
                PlatformError::without_code("platform returned no namespace id"),
            )),
            Err(e) => Err(ReconcileError::provisioning(operation, e)),
        }
    }

    /// Temporary credentials for pushing to or pulling from the registry.
    pub async fn authorization(&self) -> Result<RegistryCredentials, ReconcileError> {
        self.registry
            .authorization_token()
            .await
            .map_err(|e| ReconcileError::provisioning("Get registry authorization token", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::sandbox::{Operation, SandboxPlatform};

    #[tokio::test]
    async fn test_ensure_namespace_creates_once() {
        let platform = Arc::new(SandboxPlatform::new("1234", "cn-hangzhou"));
        let service = RegistryService::new(platform.clone());

        service.ensure_namespace("team").await.unwrap();
        service.ensure_namespace("team").await.unwrap();

        assert_eq!(platform.count(Operation::CreateNamespace), 1);
        assert_eq!(platform.count(Operation::NamespaceExists), 2);
    }

    #[tokio::test]
    async fn test_missing_namespace_id_is_an_error() {
        let platform = Arc::new(SandboxPlatform::new("1234", "cn-hangzhou"));
        platform.omit_namespace_ids(true);

        let err = RegistryService::new(platform.clone())
            .ensure_namespace("team")
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Provisioning { .. }));
    }

    #[tokio::test]
    async fn test_authorization_token() {
        let platform = Arc::new(SandboxPlatform::new("1234", "cn-hangzhou"));
        let registry = RegistryService::new(platform);
        let creds = registry.authorization().await.unwrap();

        assert_eq!(creds.user, "cr_temp_user");
        assert!(!creds.password.is_empty());
    }
}

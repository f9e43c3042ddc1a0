// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Service Deployer
//!
//! Entry point of the reconciliation engine. Wires the stages together for one
//! credentials/region pair:
//!
//! ```text
//! deploy:   RoleResolver -> DependentResolver -> ServiceConvergence (-> NasDirectoryEnforcer)
//! remove:   delete service
//! teardown: TeardownCoordinator
//! ```
//!
//! Every stage is idempotent, so re-running a deploy is always safe.

use crate::application::convergence::ServiceConvergence;
use crate::application::dependents::DependentResolver;
use crate::application::nas_directory::NasDirectoryEnforcer;
use crate::application::retry::{LogPropagationPolicy, RetryPolicy};
use crate::application::role::{RoleRequest, RoleResolver};
use crate::application::tags::TagManager;
use crate::application::teardown::{TeardownCoordinator, TeardownReport};
use crate::domain::deploy_config::DeployConfigSpec;
use crate::domain::errors::ReconcileError;
use crate::domain::mount_point::validate_mount_points;
use crate::domain::platform::{ComputeClient, Credentials, PlatformClients};
use crate::domain::service::{NasAttachment, ServiceManifest, ServiceOptions, ServiceSpec};
use std::sync::Arc;
use tracing::{debug, info};

pub struct ServiceDeployer {
    compute: Arc<dyn ComputeClient>,
    roles: RoleResolver,
    dependents: DependentResolver,
    convergence: ServiceConvergence,
    teardown: TeardownCoordinator,
    tags: TagManager,
    account_id: String,
    region: String,
}

impl ServiceDeployer {
    pub fn new(
        clients: PlatformClients,
        credentials: Credentials,
        config: &DeployConfigSpec,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config.retry);
        let region = config.region.clone();

        let helper = config.helper.clone();
        let enforcer = NasDirectoryEnforcer::new(clients.compute.clone(), retry.clone(), helper);
        let convergence = ServiceConvergence::new(
            clients.compute.clone(),
            retry,
            LogPropagationPolicy::from_config(&config.log_propagation),
            enforcer,
        );

        Self {
            compute: clients.compute.clone(),
            roles: RoleResolver::new(clients.identity.clone(), region.clone()),
            dependents: DependentResolver::new(
                clients.network.clone(),
                clients.filesystem.clone(),
                clients.logs.clone(),
                credentials.clone(),
                region.clone(),
            ),
            convergence,
            teardown: TeardownCoordinator::new(
                clients.compute.clone(),
                clients.network,
                clients.filesystem,
                clients.logs,
                credentials.clone(),
                region.clone(),
                config.helper.clone(),
            ),
            tags: TagManager::new(clients.compute),
            account_id: credentials.account_id,
            region,
        }
    }

    /// Reconcile one service. Returns the service name.
    pub async fn deploy(
        &self,
        service_name: &str,
        spec: &ServiceSpec,
        has_async_config: bool,
        has_container_config: bool,
    ) -> Result<String, ReconcileError> {
        info!("Deploying service {}", service_name);

        // Caller-declared mounts are checked before anything remote happens.
        if let Some(nas) = spec.nas.explicit() {
            validate_mount_points(&NasAttachment::from(nas))?;
        }

        let role = self
            .roles
            .resolve(RoleRequest {
                service_name,
                spec,
                async_invocation: has_async_config,
                custom_container: has_container_config,
            })
            .await?;

        let dependents = self.dependents.resolve(service_name, spec).await?;

        let options = ServiceOptions {
            description: spec.description.clone(),
            role: role.arn,
            log_config: dependents.log,
            vpc_config: dependents.vpc,
            nas_config: dependents.nas,
            internet_access: spec.internet_access,
        };
        debug!(
            "Resolved options for service {}: {:?}",
            service_name, options
        );

        let service = self.convergence.converge(service_name, &options).await?;
        info!("Service {} deployed ({})", service_name, service.service_id);

        Ok(service_name.to_string())
    }

    /// Deploy a manifest, then apply its tags to the service.
    pub async fn deploy_manifest(
        &self,
        manifest: &ServiceManifest,
    ) -> Result<String, ReconcileError> {
        let name = self
            .deploy(
                &manifest.service_name,
                &manifest.properties,
                manifest.async_invocation,
                manifest.custom_container,
            )
            .await?;

        if !manifest.tags.is_empty() {
            self.tags
                .deploy(&self.service_arn(&name), &manifest.tags, None)
                .await?;
        }
        Ok(name)
    }

    pub async fn remove(&self, service_name: &str) -> Result<(), ReconcileError> {
        info!("Deleting service {}", service_name);
        self.compute
            .delete_service(service_name)
            .await
            .map_err(|source| ReconcileError::DeleteFailed {
                service: service_name.to_string(),
                source,
            })?;
        info!("Deleted service {}", service_name);
        Ok(())
    }

    /// Best-effort removal of generated resources. Never fails.
    pub async fn remove_auto_generated_resources(
        &self,
        service_name: &str,
        spec: &ServiceSpec,
    ) -> TeardownReport {
        self.teardown.teardown(service_name, spec).await
    }

    pub fn tags(&self) -> &TagManager {
        &self.tags
    }

    /// ARN of a service in this deployer's account and region.
    pub fn service_arn(&self, service_name: &str) -> String {
        format!(
            "acs:fc:{}:{}:services/{}",
            self.region, self.account_id, service_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::platform::PlatformError;
    use crate::domain::service::{Declared, FilesystemConfig, Tag, ToolMountPoint};
    use crate::infrastructure::sandbox::{Operation, SandboxPlatform};

    fn deployer(platform: &Arc<SandboxPlatform>) -> ServiceDeployer {
        let credentials = Credentials {
            account_id: "1234".to_string(),
            ..Default::default()
        };
        let config = DeployConfigSpec::default();
        ServiceDeployer::new(platform.clients(), credentials, &config)
    }

    #[tokio::test]
    async fn test_bare_service_has_no_role() {
        let platform = Arc::new(SandboxPlatform::new("1234", "cn-hangzhou"));
        let spec = ServiceSpec {
            description: Some("plain".to_string()),
            ..Default::default()
        };

        let deployer = deployer(&platform);
        let name = deployer.deploy("plain", &spec, false, false).await.unwrap();

        assert_eq!(name, "plain");
        let service = platform.service("plain").unwrap();
        assert_eq!(service.role, "");
        assert_eq!(service.internet_access, None);
        assert_eq!(platform.count(Operation::MakeRole), 0);
    }

    #[tokio::test]
    async fn test_invalid_extreme_mount_fails_before_remote_calls() {
        let platform = Arc::new(SandboxPlatform::new("1234", "cn-hangzhou"));
        let spec = ServiceSpec {
            nas: Declared::Explicit(FilesystemConfig {
                user_id: Some(10003),
                group_id: Some(10003),
                mount_points: vec![ToolMountPoint {
                    server_addr: "abc.extreme.nas.aliyuncs.com:/data".to_string(),
                    nas_dir: None,
                    mount_dir: "/mnt/d".to_string(),
                }],
            }),
            ..Default::default()
        };

        let deployer = deployer(&platform);
        let result = deployer.deploy("demo", &spec, false, false).await;
        let err = result.unwrap_err();

        assert!(err.is_configuration_error());
        assert!(platform.journal().is_empty());
    }

    #[tokio::test]
    async fn test_remove_maps_failure() {
        let platform = Arc::new(SandboxPlatform::new("1234", "cn-hangzhou"));
        let deployer = deployer(&platform);

        let spec = ServiceSpec::default();
        deployer.deploy("demo", &spec, false, false).await.unwrap();
        deployer.remove("demo").await.unwrap();
        assert!(platform.service("demo").is_none());

        platform.fail_always(
            Operation::DeleteService,
            PlatformError::new("ServiceNotEmpty", "has functions"),
        );
        let err = deployer.remove("demo").await.unwrap_err();
        assert!(err.to_string().starts_with("Unable to delete service demo"));
    }

    #[tokio::test]
    async fn test_manifest_tags_applied_to_service_arn() {
        let platform = Arc::new(SandboxPlatform::new("1234", "cn-hangzhou"));
        let deployer = deployer(&platform);
        let manifest = ServiceManifest {
            service_name: "demo".to_string(),
            properties: ServiceSpec::default(),
            async_invocation: false,
            custom_container: false,
            tags: vec![Tag {
                key: Some("env".to_string()),
                value: "prod".to_string(),
            }],
        };

        deployer.deploy_manifest(&manifest).await.unwrap();

        let tags = platform.resource_tags("acs:fc:cn-hangzhou:1234:services/demo");
        assert_eq!(tags.get("env").map(String::as_str), Some("prod"));
    }
}

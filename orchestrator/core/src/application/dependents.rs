// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Dependent-Resource Resolver
//!
//! Turns the caller's `Vpc`, `Nas` and `Log` declarations into the concrete
//! platform-shape configs a service write needs, provisioning default
//! infrastructure for `Auto` declarations.

use crate::domain::errors::ReconcileError;
use crate::domain::platform::{
    AutoFilesystemRequest, Credentials, FilesystemProvisioner, LogProvisioner, NetworkProvisioner,
};
use crate::domain::service::{Declared, LogDestination, NasAttachment, ServiceSpec, VpcAttachment};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedDependents {
    pub vpc: VpcAttachment,
    pub nas: NasAttachment,
    pub log: LogDestination,
}

pub struct DependentResolver {
    network: Arc<dyn NetworkProvisioner>,
    filesystem: Arc<dyn FilesystemProvisioner>,
    logs: Arc<dyn LogProvisioner>,
    credentials: Credentials,
    region: String,
}

impl DependentResolver {
    pub fn new(
        network: Arc<dyn NetworkProvisioner>,
        filesystem: Arc<dyn FilesystemProvisioner>,
        logs: Arc<dyn LogProvisioner>,
        credentials: Credentials,
        region: impl Into<String>,
    ) -> Self {
        Self {
            network,
            filesystem,
            logs,
            credentials,
            region: region.into(),
        }
    }

    pub async fn resolve(
        &self,
        service_name: &str,
        spec: &ServiceSpec,
    ) -> Result<ResolvedDependents, ReconcileError> {
        let log = self
            .logs
            .transform_log_config(&spec.log)
            .await
            .map_err(|e| ReconcileError::provisioning("Resolve log config", e))?;

        let vpc = self.resolve_network(spec).await?;
        let nas = self.resolve_filesystem(service_name, spec, &vpc).await?;

        Ok(ResolvedDependents { vpc, nas, log })
    }

    async fn resolve_network(&self, spec: &ServiceSpec) -> Result<VpcAttachment, ReconcileError> {
        // An explicit but empty vpc counts as absent
        let auto = spec.vpc.is_auto() || (!spec.vpc.is_present() && spec.nas.is_auto());
        if auto {
            info!("Using 'Vpc: Auto', generating default vpc resources");
            let vpc = self
                .network
                .create_default_if_not_exist(&self.credentials, &self.region)
                .await
                .map_err(|e| ReconcileError::provisioning("Create default vpc", e))?;
            info!(
                "Generated default vpc config: vpc {} vswitches {:?}",
                vpc.vpc_id, vpc.vswitch_ids
            );
            return Ok(vpc);
        }

        let vpc = spec.vpc.explicit().map(VpcAttachment::from);
        Ok(vpc.unwrap_or_default())
    }

    async fn resolve_filesystem(
        &self,
        service_name: &str,
        spec: &ServiceSpec,
        vpc: &VpcAttachment,
    ) -> Result<NasAttachment, ReconcileError> {
        match &spec.nas {
            Declared::Auto(hints) => {
                info!(
                    "Using 'Nas: Auto', generating a nas file system for {}",
                    service_name
                );
                let nas = self
                    .filesystem
                    .generate_auto_config(AutoFilesystemRequest {
                        credentials: &self.credentials,
                        region: &self.region,
                        service_name,
                        vpc_id: &vpc.vpc_id,
                        vswitch_ids: &vpc.vswitch_ids,
                        user_id: hints.user_id,
                        group_id: hints.group_id,
                    })
                    .await
                    .map_err(|e| ReconcileError::provisioning("Generate auto nas config", e))?;
                info!(
                    "Generated auto nas config with {} mount point(s)",
                    nas.mount_points.len()
                );
                Ok(nas)
            }
            Declared::Explicit(config) => {
                let nas = self.filesystem.transform_tool_config(config);
                debug!("Transformed nas config: {:?}", nas);
                Ok(nas)
            }
            Declared::Unset => Ok(NasAttachment::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::service::{
        AutoHints, FilesystemConfig, LogConfig, NetworkConfig, ToolMountPoint,
    };
    use crate::infrastructure::sandbox::{Operation, SandboxPlatform};

    fn resolver(platform: &Arc<SandboxPlatform>) -> DependentResolver {
        DependentResolver::new(
            platform.clone(),
            platform.clone(),
            platform.clone(),
            Credentials::default(),
            "cn-hangzhou",
        )
    }

    #[tokio::test]
    async fn test_unset_declarations_resolve_to_defaults() {
        let platform = Arc::new(SandboxPlatform::new("1234", "cn-hangzhou"));
        let resolved = resolver(&platform)
            .resolve("demo", &ServiceSpec::default())
            .await
            .unwrap();

        assert_eq!(resolved, ResolvedDependents::default());
        assert_eq!(resolved.nas.user_id, -1);
        assert_eq!(platform.count(Operation::CreateDefaultNetwork), 0);
    }

    #[tokio::test]
    async fn test_auto_nas_provisions_network_first() {
        let platform = Arc::new(SandboxPlatform::new("1234", "cn-hangzhou"));
        let spec = ServiceSpec {
            nas: Declared::Auto(AutoHints {
                user_id: Some(10003),
                group_id: Some(10004),
            }),
            ..Default::default()
        };

        let resolved = resolver(&platform).resolve("demo", &spec).await.unwrap();

        assert!(!resolved.vpc.vpc_id.is_empty());
        assert_eq!(resolved.nas.user_id, 10003);
        assert_eq!(resolved.nas.group_id, 10004);
        assert_eq!(resolved.nas.mount_points.len(), 1);
        assert_eq!(resolved.nas.mount_points[0].mount_dir, "/mnt/auto");
        assert_eq!(
            platform.journal(),
            vec![
                Operation::TransformLogConfig,
                Operation::CreateDefaultNetwork,
                Operation::GenerateAutoFilesystem,
            ]
        );
    }

    #[tokio::test]
    async fn test_explicit_vpc_used_for_auto_nas() {
        let platform = Arc::new(SandboxPlatform::new("1234", "cn-hangzhou"));
        let spec = ServiceSpec {
            vpc: Declared::Explicit(NetworkConfig {
                vpc_id: Some("vpc-mine".to_string()),
                vswitch_ids: vec!["vsw-mine".to_string()],
                security_group_id: Some("sg-mine".to_string()),
            }),
            nas: Declared::Auto(AutoHints::default()),
            ..Default::default()
        };

        let resolved = resolver(&platform).resolve("demo", &spec).await.unwrap();

        assert_eq!(resolved.vpc.vpc_id, "vpc-mine");
        assert_eq!(resolved.vpc.security_group_id, "sg-mine");
        assert_eq!(platform.count(Operation::CreateDefaultNetwork), 0);
        assert_eq!(platform.count(Operation::GenerateAutoFilesystem), 1);
    }

    #[tokio::test]
    async fn test_empty_vpc_with_auto_nas_provisions_network() {
        let platform = Arc::new(SandboxPlatform::new("1234", "cn-hangzhou"));
        let spec: ServiceSpec = serde_yaml::from_str("Vpc: {}\nNas: Auto\n").unwrap();
        assert_eq!(spec.vpc, Declared::Explicit(NetworkConfig::default()));

        let resolved = resolver(&platform).resolve("demo", &spec).await.unwrap();

        assert!(!resolved.vpc.vpc_id.is_empty());
        assert!(!resolved.vpc.vswitch_ids.is_empty());
        assert_eq!(resolved.nas.mount_points.len(), 1);
        assert_eq!(platform.count(Operation::CreateDefaultNetwork), 1);
        assert_eq!(platform.count(Operation::GenerateAutoFilesystem), 1);
    }

    #[tokio::test]
    async fn test_explicit_nas_is_transformed_without_provisioning() {
        let platform = Arc::new(SandboxPlatform::new("1234", "cn-hangzhou"));
        let spec = ServiceSpec {
            nas: Declared::Explicit(FilesystemConfig {
                user_id: Some(1),
                group_id: Some(2),
                mount_points: vec![ToolMountPoint {
                    server_addr: "abc.nas.aliyuncs.com".to_string(),
                    nas_dir: Some("/data".to_string()),
                    mount_dir: "/mnt/data".to_string(),
                }],
            }),
            log: Declared::Explicit(LogConfig {
                project: Some("p".to_string()),
                logstore: Some("l".to_string()),
            }),
            ..Default::default()
        };

        let resolved = resolver(&platform).resolve("demo", &spec).await.unwrap();

        assert_eq!(
            resolved.nas.mount_points[0].server_addr,
            "abc.nas.aliyuncs.com:/data"
        );
        assert_eq!(resolved.log.project, "p");
        assert_eq!(resolved.log.logstore, "l");
        assert_eq!(platform.count(Operation::GenerateAutoFilesystem), 0);
        assert_eq!(platform.count(Operation::CreateDefaultNetwork), 0);
    }

    #[tokio::test]
    async fn test_auto_log_provisions_default_project() {
        let platform = Arc::new(SandboxPlatform::new("1234", "cn-hangzhou"));
        let spec = ServiceSpec {
            log: Declared::Auto(AutoHints::default()),
            ..Default::default()
        };

        let resolved = resolver(&platform).resolve("demo", &spec).await.unwrap();

        assert_eq!(resolved.log, platform.default_log_destination());
        assert!(platform.default_log_project_exists());
    }
}

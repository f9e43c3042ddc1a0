// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use super::{DefaultInfrastructure, Operation, SandboxPlatform};
use crate::domain::platform::{
    AutoFilesystemRequest, Credentials, DefaultNetwork, FilesystemProvisioner, LogProvisioner,
    NetworkProvisioner, PlatformError,
};
use crate::domain::service::{
    Declared, LogConfig, LogDestination, NasAttachment, NasMountPoint, VpcAttachment,
};
use async_trait::async_trait;

/// Owner applied to auto-provisioned file systems when no hint is given.
const AUTO_NAS_OWNER_ID: i32 = 10003;
const AUTO_NAS_MOUNT_DIR: &str = "/mnt/auto";

#[async_trait]
impl NetworkProvisioner for SandboxPlatform {
    async fn create_default_if_not_exist(
        &self,
        _credentials: &Credentials,
        _region: &str,
    ) -> Result<VpcAttachment, PlatformError> {
        let mut state = self.enter(Operation::CreateDefaultNetwork)?;
        let infrastructure = state
            .default_infrastructure
            .get_or_insert_with(|| DefaultInfrastructure {
                network: DefaultNetwork {
                    vpc_id: format!("vpc-{}", Self::short_id()),
                    vswitch_id: format!("vsw-{}", Self::short_id()),
                },
                security_group_id: format!("sg-{}", Self::short_id()),
            });

        Ok(VpcAttachment {
            vpc_id: infrastructure.network.vpc_id.clone(),
            vswitch_ids: vec![infrastructure.network.vswitch_id.clone()],
            security_group_id: infrastructure.security_group_id.clone(),
        })
    }

    async fn find_default(
        &self,
        _credentials: &Credentials,
        _region: &str,
    ) -> Result<Option<DefaultNetwork>, PlatformError> {
        let state = self.enter(Operation::FindDefaultNetwork)?;
        Ok(state
            .default_infrastructure
            .as_ref()
            .map(|infrastructure| infrastructure.network.clone()))
    }
}

#[async_trait]
impl FilesystemProvisioner for SandboxPlatform {
    async fn generate_auto_config(
        &self,
        request: AutoFilesystemRequest<'_>,
    ) -> Result<NasAttachment, PlatformError> {
        let mut state = self.enter(Operation::GenerateAutoFilesystem)?;
        if request.vpc_id.is_empty() || request.vswitch_ids.is_empty() {
            return Err(PlatformError::new(
                "InvalidParameter",
                "an auto nas file system needs a vpc and at least one vswitch",
            ));
        }

        let region = request.region;
        let domain = state
            .filesystems
            .entry(request.vpc_id.to_string())
            .or_insert_with(|| format!("{}-auto.{}.nas.aliyuncs.com", Self::short_id(), region))
            .clone();

        Ok(NasAttachment {
            user_id: request.user_id.unwrap_or(AUTO_NAS_OWNER_ID),
            group_id: request.group_id.unwrap_or(AUTO_NAS_OWNER_ID),
            mount_points: vec![NasMountPoint {
                server_addr: format!("{}:/{}", domain, request.service_name),
                mount_dir: AUTO_NAS_MOUNT_DIR.to_string(),
            }],
        })
    }

    async fn delete_default_if_exist(
        &self,
        _credentials: &Credentials,
        _region: &str,
        network: &DefaultNetwork,
    ) -> Result<(), PlatformError> {
        let mut state = self.enter(Operation::DeleteDefaultFilesystem)?;
        state.filesystems.remove(&network.vpc_id);
        Ok(())
    }
}

#[async_trait]
impl LogProvisioner for SandboxPlatform {
    async fn transform_log_config(
        &self,
        declared: &Declared<LogConfig>,
    ) -> Result<LogDestination, PlatformError> {
        let mut state = self.enter(Operation::TransformLogConfig)?;
        match declared {
            Declared::Auto(_) => {
                if !state.log_project_exists {
                    state.log_project_exists = true;
                    state.log_lag_remaining = state.settings.log_visibility_lag;
                }
                Ok(self.default_log_destination())
            }
            Declared::Explicit(config) => Ok(LogDestination {
                project: config.project.clone().unwrap_or_default(),
                logstore: config.logstore.clone().unwrap_or_default(),
            }),
            Declared::Unset => Ok(LogDestination::default()),
        }
    }

    async fn default_project_exists(&self) -> Result<bool, PlatformError> {
        let state = self.enter(Operation::DefaultLogProjectExists)?;
        Ok(state.log_project_exists)
    }

    async fn delete_default_project(&self) -> Result<(), PlatformError> {
        let mut state = self.enter(Operation::DeleteDefaultLogProject)?;
        if !state.log_project_exists {
            return Err(PlatformError::new("ProjectNotExist", "default log project does not exist"));
        }
        state.log_project_exists = false;
        state.log_lag_remaining = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::service::AutoHints;

    const REGION: &str = "cn-hangzhou";

    async fn default_network(platform: &SandboxPlatform) -> VpcAttachment {
        let creds = Credentials::default();
        platform
            .create_default_if_not_exist(&creds, REGION)
            .await
            .unwrap()
    }

    async fn find_network(platform: &SandboxPlatform) -> Option<DefaultNetwork> {
        let creds = Credentials::default();
        platform.find_default(&creds, REGION).await.unwrap()
    }

    #[tokio::test]
    async fn test_default_network_is_reused() {
        let platform = SandboxPlatform::new("1234", REGION);

        assert!(find_network(&platform).await.is_none());
        let first = default_network(&platform).await;
        let second = default_network(&platform).await;

        assert_eq!(first, second);
        let found = find_network(&platform).await.unwrap();
        assert_eq!(found.vpc_id, first.vpc_id);
    }

    #[tokio::test]
    async fn test_auto_filesystem_per_vpc() {
        let platform = SandboxPlatform::new("1234", REGION);
        let creds = Credentials::default();
        let vpc = default_network(&platform).await;

        let request = AutoFilesystemRequest {
            credentials: &creds,
            region: REGION,
            service_name: "demo",
            vpc_id: &vpc.vpc_id,
            vswitch_ids: &vpc.vswitch_ids,
            user_id: None,
            group_id: Some(20000),
        };
        let nas = platform
            .generate_auto_config(request.clone())
            .await
            .unwrap();
        platform.generate_auto_config(request).await.unwrap();

        assert_eq!(platform.filesystem_count(), 1);
        assert_eq!(nas.user_id, AUTO_NAS_OWNER_ID);
        assert_eq!(nas.group_id, 20000);
        assert!(nas.mount_points[0].server_addr.ends_with(":/demo"));

        let network = find_network(&platform).await.unwrap();
        platform
            .delete_default_if_exist(&creds, REGION, &network)
            .await
            .unwrap();
        assert_eq!(platform.filesystem_count(), 0);
    }

    #[tokio::test]
    async fn test_log_project_lifecycle() {
        let platform = SandboxPlatform::new("1234", REGION);
        assert!(!platform.default_project_exists().await.unwrap());

        let declared = Declared::Auto(AutoHints::default());
        let resolved = platform.transform_log_config(&declared).await.unwrap();
        assert_eq!(resolved, platform.default_log_destination());
        assert!(platform.default_project_exists().await.unwrap());

        platform.delete_default_project().await.unwrap();
        assert!(platform.delete_default_project().await.is_err());
    }
}

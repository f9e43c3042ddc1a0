// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Teardown Coordinator
//!
//! Best-effort removal of what the forward path generated on the caller's
//! behalf: the nas helper function and its triggers, the auto-provisioned
//! file system and the auto-provisioned log project. Every step runs
//! independently; failures are collected into a [`TeardownReport`] and
//! logged, never returned as errors.

use crate::domain::deploy_config::HelperConfig;
use crate::domain::platform::{
    ComputeClient, Credentials, FilesystemProvisioner, LogProvisioner, NetworkProvisioner,
    PlatformError, FUNCTION_NOT_FOUND, SERVICE_NOT_FOUND,
};
use crate::domain::service::ServiceSpec;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownFailure {
    pub step: String,
    pub error: PlatformError,
}

impl fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.error)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, step: impl Into<String>, error: PlatformError) {
        let failure = TeardownFailure {
            step: step.into(),
            error,
        };
        warn!("{}", failure);
        self.failures.push(failure);
    }
}

pub struct TeardownCoordinator {
    compute: Arc<dyn ComputeClient>,
    network: Arc<dyn NetworkProvisioner>,
    filesystem: Arc<dyn FilesystemProvisioner>,
    logs: Arc<dyn LogProvisioner>,
    credentials: Credentials,
    region: String,
    helper: HelperConfig,
}

impl TeardownCoordinator {
    pub fn new(
        compute: Arc<dyn ComputeClient>,
        network: Arc<dyn NetworkProvisioner>,
        filesystem: Arc<dyn FilesystemProvisioner>,
        logs: Arc<dyn LogProvisioner>,
        credentials: Credentials,
        region: impl Into<String>,
        helper: HelperConfig,
    ) -> Self {
        Self {
            compute,
            network,
            filesystem,
            logs,
            credentials,
            region: region.into(),
            helper,
        }
    }

    pub async fn teardown(&self, service_name: &str, spec: &ServiceSpec) -> TeardownReport {
        let mut report = TeardownReport::default();

        self.remove_helper_function(&mut report).await;

        if spec.nas.is_auto() {
            self.remove_auto_filesystem(&mut report).await;
        }

        if spec.log.is_auto() {
            self.remove_auto_log_project(&mut report).await;
        }

        if report.is_clean() {
            info!(
                "Removed auto generated resources for service {}",
                service_name
            );
        } else {
            warn!(
                "Removed auto generated resources for service {} with {} failure(s)",
                service_name,
                report.failures.len()
            );
        }
        report
    }

    async fn remove_helper_function(&self, report: &mut TeardownReport) {
        let compute = self.compute.as_ref();
        let service = &self.helper.service_name;
        let function = &self.helper.function_name;

        match compute.get_function(service, function).await {
            Ok(_) => {}
            Err(e) if e.has_code(FUNCTION_NOT_FOUND) || e.has_code(SERVICE_NOT_FOUND) => return,
            Err(e) => {
                report.record(format!("Look up helper function {}", function), e);
                return;
            }
        }

        match compute.list_triggers(service, function).await {
            Ok(triggers) => {
                for trigger in triggers {
                    if let Err(e) = compute.delete_trigger(service, function, &trigger).await {
                        report.record(format!("Remove trigger {} of {}", trigger, function), e);
                    }
                }
            }
            Err(e) => report.record(format!("Remove triggers of {}", function), e),
        }

        match compute.delete_function(service, function).await {
            Ok(()) => info!("Removed nas helper function {}", function),
            Err(e) => report.record(format!("Remove function {}", function), e),
        }
    }

    async fn remove_auto_filesystem(&self, report: &mut TeardownReport) {
        let found = self.network.find_default(&self.credentials, &self.region);
        let network = match found.await {
            Ok(Some(network)) => network,
            Ok(None) => return,
            Err(e) => {
                report.record("Find default vpc", e);
                return;
            }
        };

        if let Err(e) = self
            .filesystem
            .delete_default_if_exist(&self.credentials, &self.region, &network)
            .await
        {
            report.record("Delete auto generated nas", e);
        }
    }

    async fn remove_auto_log_project(&self, report: &mut TeardownReport) {
        match self.logs.default_project_exists().await {
            Ok(true) => {
                if let Err(e) = self.logs.delete_default_project().await {
                    report.record("Delete auto generated log project", e);
                }
            }
            Ok(false) => {}
            Err(e) => report.record("Check auto generated log project", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::platform::{FunctionCode, FunctionDefinition};
    use crate::domain::service::{AutoHints, Declared, ServiceOptions};
    use crate::infrastructure::sandbox::{Operation, SandboxPlatform};

    fn coordinator(platform: &Arc<SandboxPlatform>) -> TeardownCoordinator {
        TeardownCoordinator::new(
            platform.clone(),
            platform.clone(),
            platform.clone(),
            platform.clone(),
            Credentials::default(),
            "cn-hangzhou",
            HelperConfig::default(),
        )
    }

    fn auto_spec() -> ServiceSpec {
        ServiceSpec {
            nas: Declared::Auto(AutoHints::default()),
            log: Declared::Auto(AutoHints::default()),
            ..Default::default()
        }
    }

    async fn install_helper(platform: &SandboxPlatform, triggers: &[&str]) {
        let helper = HelperConfig::default();
        let definition = FunctionDefinition {
            description: String::new(),
            handler: helper.handler.clone(),
            initializer: String::new(),
            timeout: helper.timeout_secs,
            memory_size: helper.memory_mb,
            runtime: helper.runtime.clone(),
            code: FunctionCode::default(),
        };
        platform
            .create_service(&helper.service_name, &ServiceOptions::default())
            .await
            .unwrap();
        platform
            .create_function(&helper.service_name, &helper.function_name, &definition)
            .await
            .unwrap();
        for trigger in triggers {
            platform.add_trigger(&helper.service_name, &helper.function_name, trigger);
        }
    }

    #[tokio::test]
    async fn test_nothing_to_remove() {
        let platform = Arc::new(SandboxPlatform::new("1234", "cn-hangzhou"));
        let report = coordinator(&platform)
            .teardown("demo", &ServiceSpec::default())
            .await;

        assert!(report.is_clean());
        assert_eq!(platform.journal(), vec![Operation::GetFunction]);
    }

    #[tokio::test]
    async fn test_removes_helper_triggers_then_function() {
        let platform = Arc::new(SandboxPlatform::new("1234", "cn-hangzhou"));
        install_helper(&platform, &["timer", "http"]).await;
        platform.clear_journal();

        let report = coordinator(&platform)
            .teardown("demo", &ServiceSpec::default())
            .await;

        assert!(report.is_clean());
        assert_eq!(
            platform.journal(),
            vec![
                Operation::GetFunction,
                Operation::ListTriggers,
                Operation::DeleteTrigger,
                Operation::DeleteTrigger,
                Operation::DeleteFunction,
            ]
        );
        assert!(platform
            .function_definition("fc-generated-default-service", "nas_dir_checker")
            .is_none());
    }

    #[tokio::test]
    async fn test_trigger_failure_does_not_stop_function_removal() {
        let platform = Arc::new(SandboxPlatform::new("1234", "cn-hangzhou"));
        install_helper(&platform, &["timer"]).await;
        platform.fail_always(
            Operation::DeleteTrigger,
            PlatformError::new("InternalError", "boom"),
        );

        let report = coordinator(&platform)
            .teardown("demo", &ServiceSpec::default())
            .await;

        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].step.contains("timer"));
        assert_eq!(platform.count(Operation::DeleteFunction), 1);
    }

    #[tokio::test]
    async fn test_missing_default_network_skips_nas_deletion() {
        let platform = Arc::new(SandboxPlatform::new("1234", "cn-hangzhou"));

        let report = coordinator(&platform)
            .teardown("demo", &ServiceSpec {
                nas: Declared::Auto(AutoHints::default()),
                ..Default::default()
            })
            .await;

        assert!(report.is_clean());
        assert_eq!(platform.count(Operation::FindDefaultNetwork), 1);
        assert_eq!(platform.count(Operation::DeleteDefaultFilesystem), 0);
    }

    #[tokio::test]
    async fn test_removes_auto_nas_and_log_project() {
        let platform = Arc::new(SandboxPlatform::new("1234", "cn-hangzhou"));
        platform
            .create_default_if_not_exist(&Credentials::default(), "cn-hangzhou")
            .await
            .unwrap();
        let log = Declared::Auto(AutoHints::default());
        platform.transform_log_config(&log).await.unwrap();

        let report = coordinator(&platform).teardown("demo", &auto_spec()).await;

        assert!(report.is_clean());
        assert_eq!(platform.count(Operation::DeleteDefaultFilesystem), 1);
        assert_eq!(platform.count(Operation::DeleteDefaultLogProject), 1);
        assert!(!platform.default_log_project_exists());
    }

    #[tokio::test]
    async fn test_failures_are_collected_not_raised() {
        let platform = Arc::new(SandboxPlatform::new("1234", "cn-hangzhou"));
        platform.fail_always(
            Operation::GetFunction,
            PlatformError::new("InternalError", "down"),
        );
        platform.fail_always(
            Operation::FindDefaultNetwork,
            PlatformError::without_code("timeout"),
        );
        platform.fail_always(
            Operation::DefaultLogProjectExists,
            PlatformError::new("Unauthorized", "no"),
        );

        let report = coordinator(&platform).teardown("demo", &auto_spec()).await;

        assert_eq!(report.failures.len(), 3);
        assert_eq!(platform.count(Operation::DeleteFunction), 0);
        assert_eq!(platform.count(Operation::DeleteDefaultLogProject), 0);
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! NAS Directory Enforcer
//!
//! Remote directories referenced by mount points may not exist yet, and a
//! service cannot start with a mount on a missing directory. The enforcer
//! deploys a throwaway helper function that mounts each file system at its
//! root, then invokes it with the directories to create.

use crate::application::convergence::{classify_write_error, lookup_service, write_service};
use crate::application::retry::RetryPolicy;
use crate::domain::deploy_config::HelperConfig;
use crate::domain::errors::ReconcileError;
use crate::domain::mount_point::DirectoryPlan;
use crate::domain::platform::{
    ComputeClient, FunctionCode, FunctionDefinition, InvocationResponse, FUNCTION_NOT_FOUND,
    LOG_RESULT_HEADER, LOG_TYPE_HEADER,
};
use crate::domain::service::{LogDestination, NasAttachment, ServiceOptions, VpcAttachment};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Program run by the helper function.
pub const HELPER_PROGRAM: &str = include_str!("../../assets/nas-dir-check.js");
pub const HELPER_ENTRY_FILE: &str = "index.js";

const HELPER_SERVICE_DESCRIPTION: &str = "generated by svcforge";
const HELPER_FUNCTION_DESCRIPTION: &str = "used by svcforge to ensure nas remote directories exist";
const SUCCESS_BODY: &str = "OK";

pub struct NasDirectoryEnforcer {
    compute: Arc<dyn ComputeClient>,
    retry: RetryPolicy,
    helper: HelperConfig,
}

impl NasDirectoryEnforcer {
    pub fn new(compute: Arc<dyn ComputeClient>, retry: RetryPolicy, helper: HelperConfig) -> Self {
        Self {
            compute,
            retry,
            helper,
        }
    }

    pub fn is_helper_service(&self, service_name: &str) -> bool {
        service_name == self.helper.service_name
    }

    /// Make sure every remote directory referenced by `nas_config` exists.
    pub async fn ensure_directories(
        &self,
        role: &str,
        vpc_config: &VpcAttachment,
        nas_config: &NasAttachment,
    ) -> Result<(), ReconcileError> {
        let plan = DirectoryPlan::from_config(nas_config)?;
        debug!("dirs need to check: {:?}", plan.directories);

        if plan.is_empty() {
            return Ok(());
        }

        info!(
            "Checking if nas directories {:?} exist, missing ones will be created",
            plan.remote_dirs
        );

        self.deploy_helper_service(role, vpc_config, &plan.helper_config)
            .await?;
        self.deploy_helper_function().await?;

        tokio::time::sleep(self.helper.invoke_delay).await;

        let payload = serde_json::json!(plan.directories).to_string();
        let mut headers = BTreeMap::new();
        headers.insert(LOG_TYPE_HEADER.to_string(), "Tail".to_string());

        let service_name = &self.helper.service_name;
        let function_name = &self.helper.function_name;
        let response = self
            .compute
            .invoke_function(service_name, function_name, &payload, &headers)
            .await
            .map_err(|e| {
                let operation = format!("Invoke helper function {}", function_name);
                ReconcileError::provisioning(operation, e)
            })?;

        self.interpret(&response)?;

        info!("Checking nas directories done {:?}", plan.remote_dirs);
        Ok(())
    }

    /// Create or update the helper service. It never has a log destination,
    /// so writes are retried without waiting on log propagation.
    async fn deploy_helper_service(
        &self,
        role: &str,
        vpc_config: &VpcAttachment,
        nas_config: &NasAttachment,
    ) -> Result<(), ReconcileError> {
        let compute = self.compute.as_ref();
        let service_name = self.helper.service_name.as_str();

        let existing = lookup_service(compute, &self.retry, service_name).await?;
        let create = existing.is_none();

        let options = &ServiceOptions {
            description: Some(HELPER_SERVICE_DESCRIPTION.to_string()),
            role: role.to_string(),
            log_config: LogDestination::default(),
            vpc_config: vpc_config.clone(),
            nas_config: nas_config.clone(),
            internet_access: Some(true),
        };

        let operation = format!("Deploy helper service {}", service_name);
        let op = operation.as_str();
        self.retry
            .run(op, move |_| async move {
                write_service(compute, service_name, options, create)
                    .await
                    .map_err(|e| classify_write_error(op, e))
            })
            .await?;

        Ok(())
    }

    async fn deploy_helper_function(&self) -> Result<(), ReconcileError> {
        let service_name = &self.helper.service_name;
        let function_name = &self.helper.function_name;

        let exists = match self.compute.get_function(service_name, function_name).await {
            Ok(_) => true,
            Err(e) if e.has_code(FUNCTION_NOT_FOUND) => false,
            Err(e) => {
                return Err(ReconcileError::provisioning(
                    format!("Get helper function {}", function_name),
                    e,
                ))
            }
        };

        let definition = self.helper_definition();
        let result = if exists {
            self.compute
                .update_function(service_name, function_name, &definition)
                .await
        } else {
            self.compute
                .create_function(service_name, function_name, &definition)
                .await
        };

        result.map_err(|e| {
            ReconcileError::provisioning(format!("Deploy helper function {}", function_name), e)
        })?;
        Ok(())
    }

    fn helper_definition(&self) -> FunctionDefinition {
        let mut files = BTreeMap::new();
        files.insert(HELPER_ENTRY_FILE.to_string(), HELPER_PROGRAM.to_string());

        FunctionDefinition {
            description: HELPER_FUNCTION_DESCRIPTION.to_string(),
            handler: self.helper.handler.clone(),
            initializer: String::new(),
            timeout: self.helper.timeout_secs,
            memory_size: self.helper.memory_mb,
            runtime: self.helper.runtime.clone(),
            code: FunctionCode { files },
        }
    }

    fn interpret(&self, response: &InvocationResponse) -> Result<(), ReconcileError> {
        if response.body == SUCCESS_BODY {
            return Ok(());
        }

        let Some(encoded) = response.header(LOG_RESULT_HEADER) else {
            // Nothing else to go on; the platform dropped the log tail.
            warn!(
                "Helper function {} returned '{}' without a log tail, assuming success",
                self.helper.function_name, response.body
            );
            return Ok(());
        };

        let log = decode_log(encoded);
        let function = self.helper.function_name.clone();
        if log.to_lowercase().contains("permission denied") {
            Err(ReconcileError::PermissionDenied { function, log })
        } else {
            Err(ReconcileError::HelperInvocationFailed { function, log })
        }
    }
}

fn decode_log(encoded: &str) -> String {
    match STANDARD.decode(encoded) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => encoded.to_string(),
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Service Convergence Loop
//!
//! Brings one named service to the resolved options:
//!
//! 1. **Lookup**: fetch the service. Found means update, `ServiceNotFound`
//!    means create. Authorization problems fail immediately; anything else is
//!    retried with backoff.
//! 2. **Write**: create or update. Writes that reference a log destination
//!    the platform cannot see yet are retried on a fixed schedule inside each
//!    backoff attempt. `AccessDenied` and `InvalidArgument` are terminal.
//! 3. **Directories**: services with nas mount points get their remote
//!    directories ensured by the [`NasDirectoryEnforcer`].

use crate::application::nas_directory::NasDirectoryEnforcer;
use crate::application::retry::{LogPropagationPolicy, RetryDecision, RetryPolicy};
use crate::domain::errors::ReconcileError;
use crate::domain::platform::{ComputeClient, PlatformError, SERVICE_NOT_FOUND};
use crate::domain::service::{ResolvedService, ServiceOptions};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SERVICE_NOT_ENABLED_HINT: &str = "is not enabled";

pub struct ServiceConvergence {
    compute: Arc<dyn ComputeClient>,
    retry: RetryPolicy,
    log_propagation: LogPropagationPolicy,
    enforcer: NasDirectoryEnforcer,
}

/// Why a single write (including its log propagation retries) failed.
enum WriteFailure {
    LogNotReady {
        attempts: u32,
        source: PlatformError,
    },
    Platform(PlatformError),
}

impl ServiceConvergence {
    pub fn new(
        compute: Arc<dyn ComputeClient>,
        retry: RetryPolicy,
        log_propagation: LogPropagationPolicy,
        enforcer: NasDirectoryEnforcer,
    ) -> Self {
        Self {
            compute,
            retry,
            log_propagation,
            enforcer,
        }
    }

    pub async fn converge(
        &self,
        service_name: &str,
        options: &ServiceOptions,
    ) -> Result<ResolvedService, ReconcileError> {
        let compute = self.compute.as_ref();
        let existing = lookup_service(compute, &self.retry, service_name).await?;
        let create = existing.is_none();

        let operation = operation_name(service_name, create);
        let op = operation.as_str();
        let service = self
            .retry
            .run(op, move |_| async move {
                let written = self.write_until_log_visible(service_name, options, create);
                match written.await {
                    Ok(service) => Ok(service),
                    Err(WriteFailure::LogNotReady { attempts, source }) => Err(RetryDecision::Fail(
                        ReconcileError::LogDestinationNotReady { attempts, source },
                    )),
                    Err(WriteFailure::Platform(err)) => Err(classify_write_error(op, err)),
                }
            })
            .await?;

        info!(
            "Service {} {} (role: '{}')",
            service_name,
            if create { "created" } else { "updated" },
            service.role
        );

        if !self.enforcer.is_helper_service(service_name) && options.nas_config.has_mount_points() {
            self.enforcer
                .ensure_directories(&options.role, &options.vpc_config, &options.nas_config)
                .await?;
        }

        Ok(service)
    }

    async fn write_until_log_visible(
        &self,
        service_name: &str,
        options: &ServiceOptions,
        create: bool,
    ) -> Result<ResolvedService, WriteFailure> {
        let mut attempts = 0;
        loop {
            match write_service(self.compute.as_ref(), service_name, options, create).await {
                Ok(service) => return Ok(service),
                Err(err) if err.is_log_destination_missing() => {
                    attempts += 1;
                    if attempts >= self.log_propagation.attempts {
                        return Err(WriteFailure::LogNotReady {
                            attempts,
                            source: err,
                        });
                    }
                    debug!(
                        "Log destination for service {} not visible yet ({}/{}): {}",
                        service_name, attempts, self.log_propagation.attempts, err
                    );
                    tokio::time::sleep(self.log_propagation.delay).await;
                }
                Err(err) => return Err(WriteFailure::Platform(err)),
            }
        }
    }
}

fn operation_name(service_name: &str, create: bool) -> String {
    let verb = if create { "Create" } else { "Update" };
    format!("{} service {}", verb, service_name)
}

/// Fetch a service, retrying transient errors. `Ok(None)` when it does not exist.
pub(crate) async fn lookup_service(
    compute: &dyn ComputeClient,
    retry: &RetryPolicy,
    service_name: &str,
) -> Result<Option<ResolvedService>, ReconcileError> {
    retry
        .run(&format!("get service {}", service_name), move |_| async move {
            match compute.get_service(service_name).await {
                Ok(service) => Ok(Some(service)),
                Err(err) if err.has_code(SERVICE_NOT_FOUND) => Ok(None),
                Err(err) if err.is_authorization_failure() => {
                    Err(RetryDecision::Fail(authorization_error(err)))
                }
                Err(err) => {
                    debug!(
                        "error when getService, serviceName is {}: {:?}",
                        service_name, err
                    );
                    Err(RetryDecision::Retry(err))
                }
            }
        })
        .await
}

/// One create or update call, no retries.
pub(crate) async fn write_service(
    compute: &dyn ComputeClient,
    service_name: &str,
    options: &ServiceOptions,
    create: bool,
) -> Result<ResolvedService, PlatformError> {
    if create {
        debug!("create service {}, options is {:?}", service_name, options);
        compute.create_service(service_name, options).await
    } else {
        debug!("update service {}, options is {:?}", service_name, options);
        compute.update_service(service_name, options).await
    }
}

/// `AccessDenied` and `InvalidArgument` are terminal on the write path.
pub(crate) fn classify_write_error(operation: &str, err: PlatformError) -> RetryDecision {
    if err.is_access_denied() || err.is_invalid_argument() {
        warn!("{} rejected, not retrying: {}", operation, err);
        RetryDecision::Fail(ReconcileError::Rejected {
            operation: operation.to_string(),
            source: err,
        })
    } else {
        RetryDecision::Retry(err)
    }
}

fn authorization_error(err: PlatformError) -> ReconcileError {
    if err.message.contains(SERVICE_NOT_ENABLED_HINT) {
        ReconcileError::ServiceNotEnabled { source: err }
    } else {
        ReconcileError::InvalidAccount { source: err }
    }
}

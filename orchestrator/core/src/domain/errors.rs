// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Reconciliation errors
//!
//! Configuration and authorization failures surface immediately. Transient
//! and eventual-consistency failures only appear here once their retry
//! budget is spent. Teardown failures never leave the teardown coordinator.

use crate::domain::platform::PlatformError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Role '{0}' is not a valid arn like acs:ram::<account>:role/<name>")]
    InvalidRoleReference(String),

    #[error(
        "Log.LogStore and Log.Project must both be set (got {project:?} and {logstore:?})"
    )]
    IncompleteLogConfig {
        project: Option<String>,
        logstore: Option<String>,
    },

    #[error(
        "Extreme nas mount point '{server_addr}' must start with /share, the only exported root"
    )]
    InvalidExtremeMountPath { server_addr: String },

    #[error("Function compute is not enabled for the current account: {source}")]
    ServiceNotEnabled { source: PlatformError },

    #[error(
        "Account id or credentials rejected, use the primary account id for sub-keys: {source}"
    )]
    InvalidAccount { source: PlatformError },

    #[error("{operation} was rejected by the platform: {source}")]
    Rejected {
        operation: String,
        source: PlatformError,
    },

    #[error("Log project/logstore not visible after {attempts} attempts: {source}")]
    LogDestinationNotReady {
        attempts: u32,
        source: PlatformError,
    },

    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        source: PlatformError,
    },

    #[error(
        "Helper function '{function}' could not create nas directories: {log}\n\
         The Nas UserId and GroupId may lack permission on the remote directory"
    )]
    PermissionDenied { function: String, log: String },

    #[error("Helper function '{function}' invoke error, error message is: {log}")]
    HelperInvocationFailed { function: String, log: String },

    #[error("Unable to delete service {service}: {source}")]
    DeleteFailed {
        service: String,
        source: PlatformError,
    },

    #[error("Tag '{0}' not found")]
    TagNotFound(String),

    #[error("{operation}: {source}")]
    Provisioning {
        operation: String,
        source: PlatformError,
    },
}

impl ReconcileError {
    pub fn provisioning(operation: impl Into<String>, source: PlatformError) -> Self {
        Self::Provisioning {
            operation: operation.into(),
            source,
        }
    }

    /// Errors caused by the caller's declarations rather than the platform.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRoleReference(_)
                | Self::IncompleteLogConfig { .. }
                | Self::InvalidExtremeMountPath { .. }
                | Self::TagNotFound(_)
        )
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Platform Collaborator Contracts - Anti-Corruption Layer for the cloud APIs
//!
//! The reconciliation engine never speaks a wire protocol itself. Every
//! subsystem it touches (compute, identity, network, filesystem, logging,
//! container registry) is reached through one of the traits below, built per
//! credentials/region by a [`PlatformClientFactory`].
//!
//! Errors coming back from any collaborator are normalised into
//! [`PlatformError`], which carries the machine-readable code the engine uses
//! to decide between retrying, failing fast and treating a miss as "absent".

use crate::domain::policy::PolicyDocument;
use crate::domain::service::{
    Declared, FilesystemConfig, LogConfig, LogDestination, NasAttachment, ResolvedService,
    ServiceOptions, VpcAttachment,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub const SERVICE_NOT_FOUND: &str = "ServiceNotFound";
pub const FUNCTION_NOT_FOUND: &str = "FunctionNotFound";
pub const ACCESS_DENIED: &str = "AccessDenied";
pub const HOST_NOT_FOUND: &str = "ENOTFOUND";
pub const INVALID_ARGUMENT: &str = "InvalidArgument";

/// Header asking the compute platform to return the invocation's log tail.
pub const LOG_TYPE_HEADER: &str = "x-fc-log-type";
/// Response header carrying the base64 encoded log tail.
pub const LOG_RESULT_HEADER: &str = "x-fc-log-result";

/// Error returned by any platform collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}{}", .code.as_deref().map(|c| format!("[{c}] ")).unwrap_or_default(), .message)]
pub struct PlatformError {
    /// Machine-readable error code, absent for transport level failures
    pub code: Option<String>,
    pub message: String,
}

impl PlatformError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    pub fn without_code(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }

    pub fn is_access_denied(&self) -> bool {
        self.has_code(ACCESS_DENIED)
    }

    pub fn is_invalid_argument(&self) -> bool {
        self.has_code(INVALID_ARGUMENT)
    }

    /// The platform could not be reached or did not recognise the caller.
    ///
    /// Covers a missing error code, `AccessDenied` and an unresolvable
    /// endpoint host; none of these improve by retrying.
    pub fn is_authorization_failure(&self) -> bool {
        self.code.is_none() || self.is_access_denied() || self.has_code(HOST_NOT_FOUND)
    }

    /// A referenced log project or logstore is not yet visible to the
    /// compute platform.
    pub fn is_log_destination_missing(&self) -> bool {
        self.is_invalid_argument()
            && self.message.contains("not exist")
            && (self.message.contains("logstore") || self.message.contains("project"))
    }
}

/// Access credentials for one account.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    pub access_key_id: String,
    pub access_key_secret: String,
    pub account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let security_token = self.security_token.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"<redacted>")
            .field("account_id", &self.account_id)
            .field("security_token", &security_token)
            .finish()
    }
}

// ============================================================================
// Compute
// ============================================================================

/// Source files shipped with a function. Archiving is the client's job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCode {
    pub files: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDefinition {
    pub description: String,
    pub handler: String,
    pub initializer: String,
    pub timeout: u32,
    pub memory_size: u32,
    pub runtime: String,
    pub code: FunctionCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionInfo {
    pub function_name: String,
    pub handler: String,
    pub runtime: String,
    pub last_modified_time: DateTime<Utc>,
}

/// Raw result of a synchronous invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationResponse {
    pub body: String,
    pub headers: BTreeMap<String, String>,
}

impl InvocationResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[async_trait]
pub trait ComputeClient: Send + Sync {
    async fn get_service(&self, service_name: &str) -> Result<ResolvedService, PlatformError>;

    async fn create_service(
        &self,
        service_name: &str,
        options: &ServiceOptions,
    ) -> Result<ResolvedService, PlatformError>;

    async fn update_service(
        &self,
        service_name: &str,
        options: &ServiceOptions,
    ) -> Result<ResolvedService, PlatformError>;

    async fn delete_service(&self, service_name: &str) -> Result<(), PlatformError>;

    async fn get_function(
        &self,
        service_name: &str,
        function_name: &str,
    ) -> Result<FunctionInfo, PlatformError>;

    async fn create_function(
        &self,
        service_name: &str,
        function_name: &str,
        definition: &FunctionDefinition,
    ) -> Result<FunctionInfo, PlatformError>;

    async fn update_function(
        &self,
        service_name: &str,
        function_name: &str,
        definition: &FunctionDefinition,
    ) -> Result<FunctionInfo, PlatformError>;

    async fn delete_function(
        &self,
        service_name: &str,
        function_name: &str,
    ) -> Result<(), PlatformError>;

    async fn invoke_function(
        &self,
        service_name: &str,
        function_name: &str,
        payload: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<InvocationResponse, PlatformError>;

    async fn list_triggers(
        &self,
        service_name: &str,
        function_name: &str,
    ) -> Result<Vec<String>, PlatformError>;

    async fn delete_trigger(
        &self,
        service_name: &str,
        function_name: &str,
        trigger_name: &str,
    ) -> Result<(), PlatformError>;

    async fn get_resource_tags(
        &self,
        resource_arn: &str,
    ) -> Result<BTreeMap<String, String>, PlatformError>;

    async fn tag_resource(
        &self,
        resource_arn: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), PlatformError>;

    async fn untag_resource(
        &self,
        resource_arn: &str,
        keys: &[String],
    ) -> Result<(), PlatformError>;
}

// ============================================================================
// Identity
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Role {
    pub role_name: String,
    pub arn: String,
}

#[async_trait]
pub trait IdentityClient: Send + Sync {
    /// Look up a role, creating it when absent and `create_if_absent` is set.
    async fn make_role(
        &self,
        role_name: &str,
        create_if_absent: bool,
    ) -> Result<Role, PlatformError>;

    /// Attach a platform-managed policy by name. Attaching twice is a no-op.
    async fn attach_policy_to_role(
        &self,
        policy_name: &str,
        role_name: &str,
    ) -> Result<(), PlatformError>;

    /// Create (or update) a custom policy and attach it.
    async fn make_and_attach_policy(
        &self,
        policy_name: &str,
        document: &PolicyDocument,
        role_name: &str,
    ) -> Result<(), PlatformError>;

    fn normalize_role_or_policy_name(&self, raw: &str) -> String {
        crate::domain::policy::normalize_name(raw)
    }
}

// ============================================================================
// Dependent resource provisioning
// ============================================================================

/// The default network pair used for auto-provisioned resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultNetwork {
    pub vpc_id: String,
    pub vswitch_id: String,
}

#[async_trait]
pub trait NetworkProvisioner: Send + Sync {
    async fn create_default_if_not_exist(
        &self,
        credentials: &Credentials,
        region: &str,
    ) -> Result<VpcAttachment, PlatformError>;

    async fn find_default(
        &self,
        credentials: &Credentials,
        region: &str,
    ) -> Result<Option<DefaultNetwork>, PlatformError>;
}

/// Inputs for provisioning a filesystem on behalf of a service.
#[derive(Debug, Clone)]
pub struct AutoFilesystemRequest<'a> {
    pub credentials: &'a Credentials,
    pub region: &'a str,
    pub service_name: &'a str,
    pub vpc_id: &'a str,
    pub vswitch_ids: &'a [String],
    pub user_id: Option<i32>,
    pub group_id: Option<i32>,
}

#[async_trait]
pub trait FilesystemProvisioner: Send + Sync {
    async fn generate_auto_config(
        &self,
        request: AutoFilesystemRequest<'_>,
    ) -> Result<NasAttachment, PlatformError>;

    /// Translate the caller-facing shape into the platform shape.
    fn transform_tool_config(&self, config: &FilesystemConfig) -> NasAttachment {
        NasAttachment::from(config)
    }

    async fn delete_default_if_exist(
        &self,
        credentials: &Credentials,
        region: &str,
        network: &DefaultNetwork,
    ) -> Result<(), PlatformError>;
}

#[async_trait]
pub trait LogProvisioner: Send + Sync {
    /// Resolve a declaration, provisioning the default project/logstore for `Auto`.
    async fn transform_log_config(
        &self,
        declared: &Declared<LogConfig>,
    ) -> Result<LogDestination, PlatformError>;

    async fn default_project_exists(&self) -> Result<bool, PlatformError>;

    async fn delete_default_project(&self) -> Result<(), PlatformError>;
}

// ============================================================================
// Container registry
// ============================================================================

#[derive(Clone, PartialEq, Eq)]
pub struct RegistryCredentials {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn authorization_token(&self) -> Result<RegistryCredentials, PlatformError>;

    async fn namespace_exists(&self, namespace: &str) -> Result<bool, PlatformError>;

    /// Returns the new namespace id, if the platform reported one.
    async fn create_namespace(&self, namespace: &str) -> Result<Option<String>, PlatformError>;
}

// ============================================================================
// Client construction
// ============================================================================

/// Bundle of collaborators for one credentials/region pair.
#[derive(Clone)]
pub struct PlatformClients {
    pub compute: Arc<dyn ComputeClient>,
    pub identity: Arc<dyn IdentityClient>,
    pub network: Arc<dyn NetworkProvisioner>,
    pub filesystem: Arc<dyn FilesystemProvisioner>,
    pub logs: Arc<dyn LogProvisioner>,
    pub registry: Arc<dyn RegistryClient>,
}

pub trait PlatformClientFactory: Send + Sync {
    fn build(
        &self,
        credentials: &Credentials,
        region: &str,
    ) -> Result<PlatformClients, PlatformError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_failures() {
        assert!(PlatformError::without_code("socket hang up").is_authorization_failure());
        assert!(PlatformError::new(ACCESS_DENIED, "denied").is_authorization_failure());
        assert!(PlatformError::new(HOST_NOT_FOUND, "getaddrinfo").is_authorization_failure());
        assert!(!PlatformError::new("Throttling", "slow down").is_authorization_failure());
        assert!(!PlatformError::new(SERVICE_NOT_FOUND, "missing").is_authorization_failure());
    }

    #[test]
    fn test_log_destination_missing() {
        let err = PlatformError::new(INVALID_ARGUMENT, "logstore 'demo' does not exist");
        assert!(err.is_log_destination_missing());

        let err = PlatformError::new(INVALID_ARGUMENT, "project 'demo' not exist");
        assert!(err.is_log_destination_missing());

        // Right message, wrong code
        let err = PlatformError::new("ServiceUnavailable", "project 'demo' not exist");
        assert!(!err.is_log_destination_missing());

        // Right code, unrelated message
        let err = PlatformError::new(INVALID_ARGUMENT, "role does not exist");
        assert!(!err.is_log_destination_missing());
    }

    #[test]
    fn test_display_includes_code() {
        let err = PlatformError::new(ACCESS_DENIED, "nope");
        assert_eq!(err.to_string(), "[AccessDenied] nope");
        let err = PlatformError::without_code("timeout");
        assert_eq!(err.to_string(), "timeout");
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let creds = Credentials {
            access_key_id: "AK".to_string(),
            access_key_secret: "very-secret".to_string(),
            account_id: "123".to_string(),
            security_token: Some("token".to_string()),
        };
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("very-secret"));
        assert!(!rendered.contains("\"token\""));
    }

    #[test]
    fn test_invocation_header_lookup_is_case_insensitive() {
        let mut headers = BTreeMap::new();
        headers.insert("X-Fc-Log-Result".to_string(), "bG9n".to_string());
        let response = InvocationResponse {
            body: "OK".to_string(),
            headers,
        };
        assert_eq!(response.header(LOG_RESULT_HEADER), Some("bG9n"));
    }
}

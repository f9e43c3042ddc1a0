// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Sandbox Platform
//!
//! In-memory implementation of every platform collaborator. Nothing leaves
//! the process: services, functions, roles, default infrastructure and tags
//! live in a single locked state.
//!
//! Besides modelling the platform, the sandbox can be scripted:
//!
//! - [`SandboxPlatform::fail_times`] / [`SandboxPlatform::fail_always`] make a
//!   given [`Operation`] return an error
//! - [`SandboxPlatform::set_log_visibility_lag`] delays visibility of an
//!   auto-provisioned log project to service writes
//! - every call is appended to a journal for assertions

mod compute;
mod identity;
mod provisioning;

use crate::domain::platform::{
    Credentials, DefaultNetwork, FunctionDefinition, FunctionInfo, PlatformClientFactory,
    PlatformClients, PlatformError,
};
use crate::domain::policy::PolicyDocument;
use crate::domain::service::{LogDestination, ResolvedService};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

/// Every call the sandbox can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetService,
    CreateService,
    UpdateService,
    DeleteService,
    GetFunction,
    CreateFunction,
    UpdateFunction,
    DeleteFunction,
    InvokeFunction,
    ListTriggers,
    DeleteTrigger,
    GetResourceTags,
    TagResource,
    UntagResource,
    MakeRole,
    AttachPolicy,
    MakeAndAttachPolicy,
    CreateDefaultNetwork,
    FindDefaultNetwork,
    GenerateAutoFilesystem,
    DeleteDefaultFilesystem,
    TransformLogConfig,
    DefaultLogProjectExists,
    DeleteDefaultLogProject,
    AuthorizationToken,
    NamespaceExists,
    CreateNamespace,
}

/// A recorded synchronous invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub service_name: String,
    pub function_name: String,
    pub payload: String,
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
struct StoredFunction {
    definition: FunctionDefinition,
    info: FunctionInfo,
}

#[derive(Debug, Clone)]
struct StoredRole {
    arn: String,
    policies: Vec<String>,
}

#[derive(Debug, Clone)]
struct DefaultInfrastructure {
    network: DefaultNetwork,
    security_group_id: String,
}

#[derive(Debug, Default)]
struct Settings {
    deny_nas_permissions: bool,
    suppress_invocation_logs: bool,
    omit_namespace_ids: bool,
    log_visibility_lag: u32,
}

#[derive(Debug, Default)]
struct SandboxState {
    journal: Vec<Operation>,
    scripted: HashMap<Operation, VecDeque<PlatformError>>,
    persistent: HashMap<Operation, PlatformError>,
    settings: Settings,

    services: BTreeMap<String, ResolvedService>,
    functions: BTreeMap<(String, String), StoredFunction>,
    triggers: BTreeMap<(String, String), Vec<String>>,
    invocations: Vec<Invocation>,
    nas_directories: BTreeSet<String>,
    tags: BTreeMap<String, BTreeMap<String, String>>,

    roles: BTreeMap<String, StoredRole>,
    policies: BTreeMap<String, PolicyDocument>,

    default_infrastructure: Option<DefaultInfrastructure>,
    /// Auto-provisioned file system domains, keyed by vpc id
    filesystems: BTreeMap<String, String>,
    log_project_exists: bool,
    /// Writes still to be rejected before the default log project is visible
    log_lag_remaining: u32,
    namespaces: BTreeMap<String, String>,
}

pub struct SandboxPlatform {
    account_id: String,
    region: String,
    state: Mutex<SandboxState>,
}

impl SandboxPlatform {
    pub fn new(account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            region: region.into(),
            state: Mutex::new(SandboxState::default()),
        }
    }

    /// Every collaborator of the bundle backed by this sandbox.
    pub fn clients(self: &Arc<Self>) -> PlatformClients {
        PlatformClients {
            compute: self.clone(),
            identity: self.clone(),
            network: self.clone(),
            filesystem: self.clone(),
            logs: self.clone(),
            registry: self.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Scripting
    // ------------------------------------------------------------------

    /// Fail the next `times` calls of `operation` with `error`.
    pub fn fail_times(&self, operation: Operation, error: PlatformError, times: usize) {
        let mut state = self.state.lock();
        let queue = state.scripted.entry(operation).or_default();
        queue.extend(std::iter::repeat(error).take(times));
    }

    /// Fail every call of `operation` with `error` (after any scripted failures).
    pub fn fail_always(&self, operation: Operation, error: PlatformError) {
        self.state.lock().persistent.insert(operation, error);
    }

    /// Make the nas helper report `Permission denied` for every directory.
    pub fn deny_nas_permissions(&self, deny: bool) {
        self.state.lock().settings.deny_nas_permissions = deny;
    }

    /// Drop the log tail from invocation responses.
    pub fn suppress_invocation_logs(&self, suppress: bool) {
        self.state.lock().settings.suppress_invocation_logs = suppress;
    }

    /// Let namespace creation succeed without reporting an id.
    pub fn omit_namespace_ids(&self, omit: bool) {
        self.state.lock().settings.omit_namespace_ids = omit;
    }

    /// Number of service writes referencing a freshly provisioned default
    /// log project that fail before the project becomes visible.
    pub fn set_log_visibility_lag(&self, writes: u32) {
        self.state.lock().settings.log_visibility_lag = writes;
    }

    pub fn add_trigger(&self, service_name: &str, function_name: &str, trigger_name: &str) {
        self.state
            .lock()
            .triggers
            .entry((service_name.to_string(), function_name.to_string()))
            .or_default()
            .push(trigger_name.to_string());
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn journal(&self) -> Vec<Operation> {
        self.state.lock().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.state.lock().journal.clear();
    }

    pub fn count(&self, operation: Operation) -> usize {
        self.state
            .lock()
            .journal
            .iter()
            .filter(|op| **op == operation)
            .count()
    }

    pub fn service(&self, service_name: &str) -> Option<ResolvedService> {
        self.state.lock().services.get(service_name).cloned()
    }

    pub fn function_definition(
        &self,
        service_name: &str,
        function_name: &str,
    ) -> Option<FunctionDefinition> {
        self.state
            .lock()
            .functions
            .get(&(service_name.to_string(), function_name.to_string()))
            .map(|f| f.definition.clone())
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.state.lock().invocations.clone()
    }

    /// Directories created through the nas helper.
    pub fn nas_directories(&self) -> BTreeSet<String> {
        self.state.lock().nas_directories.clone()
    }

    pub fn resource_tags(&self, resource_arn: &str) -> BTreeMap<String, String> {
        self.state
            .lock()
            .tags
            .get(resource_arn)
            .cloned()
            .unwrap_or_default()
    }

    /// Policies attached to a role, in attachment order.
    pub fn role_policies(&self, role_name: &str) -> Vec<String> {
        self.state
            .lock()
            .roles
            .get(role_name)
            .map(|r| r.policies.clone())
            .unwrap_or_default()
    }

    pub fn policy_document(&self, policy_name: &str) -> Option<PolicyDocument> {
        self.state.lock().policies.get(policy_name).cloned()
    }

    /// The destination an `Auto` log declaration resolves to.
    pub fn default_log_destination(&self) -> LogDestination {
        let digest = hex::encode(Sha256::digest(self.account_id.as_bytes()));
        LogDestination {
            project: format!("aliyun-fc-{}-{}", self.region, &digest[..12]),
            logstore: "function-log".to_string(),
        }
    }

    pub fn default_log_project_exists(&self) -> bool {
        self.state.lock().log_project_exists
    }

    pub fn filesystem_count(&self) -> usize {
        self.state.lock().filesystems.len()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Record a call and return its scripted failure, if any.
    fn enter(
        &self,
        operation: Operation,
    ) -> Result<parking_lot::MutexGuard<'_, SandboxState>, PlatformError> {
        let mut state = self.state.lock();
        state.journal.push(operation);

        let scripted = state
            .scripted
            .get_mut(&operation)
            .and_then(VecDeque::pop_front);
        if let Some(error) = scripted {
            return Err(error);
        }
        if let Some(error) = state.persistent.get(&operation) {
            return Err(error.clone());
        }
        Ok(state)
    }

    fn short_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
    }
}

/// Builds sandbox-backed client bundles.
#[derive(Debug, Default, Clone, Copy)]
pub struct SandboxClientFactory;

impl PlatformClientFactory for SandboxClientFactory {
    fn build(
        &self,
        credentials: &Credentials,
        region: &str,
    ) -> Result<PlatformClients, PlatformError> {
        let account = if credentials.account_id.is_empty() {
            "sandbox"
        } else {
            credentials.account_id.as_str()
        };
        Ok(Arc::new(SandboxPlatform::new(account, region)).clients())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::platform::ComputeClient;
    use crate::domain::service::ServiceOptions;

    #[tokio::test]
    async fn test_scripted_failures_drain_before_persistent() {
        let platform = SandboxPlatform::new("1234", "cn-hangzhou");
        platform.fail_times(
            Operation::GetService,
            PlatformError::new("Throttling", "slow"),
            1,
        );

        let first = platform.get_service("demo").await.unwrap_err();
        assert!(first.has_code("Throttling"));

        let second = platform.get_service("demo").await.unwrap_err();
        assert!(second.has_code("ServiceNotFound"));

        platform.fail_always(
            Operation::GetService,
            PlatformError::new("InternalError", "down"),
        );
        let options = ServiceOptions::default();
        platform.create_service("demo", &options).await.unwrap();
        let third = platform.get_service("demo").await.unwrap_err();
        assert!(third.has_code("InternalError"));

        assert_eq!(platform.count(Operation::GetService), 3);
    }

    #[test]
    fn test_factory_uses_account() {
        let credentials = Credentials {
            account_id: "5678".to_string(),
            ..Default::default()
        };
        let factory = SandboxClientFactory;
        let clients = factory.build(&credentials, "cn-beijing").unwrap();
        assert_eq!(clients.identity.normalize_role_or_policy_name("a_b"), "a-b");
    }

    #[test]
    fn test_default_log_destination_is_stable() {
        let a = SandboxPlatform::new("1234", "cn-hangzhou");
        let b = SandboxPlatform::new("1234", "cn-hangzhou");
        assert_eq!(a.default_log_destination(), b.default_log_destination());
        let project = a.default_log_destination().project;
        assert!(project.starts_with("aliyun-fc-cn-hangzhou-"));
    }
}

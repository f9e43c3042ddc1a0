// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Role Resolver
//!
//! Picks the execution role for a service and attaches the policies its
//! declared capabilities need. A caller-supplied role ARN is used as-is:
//! nothing is created and nothing is attached. Otherwise a conventionally
//! named default role is looked up (created when the service needs one) and
//! receives, in order:
//!
//! 1. the declared policy list,
//! 2. invocation access plus a message queue policy for async invocation,
//! 3. network interface management for vpc or nas use,
//! 4. registry read access for custom containers,
//! 5. exactly one log policy.

use crate::domain::errors::ReconcileError;
use crate::domain::platform::IdentityClient;
use crate::domain::policy::{
    AttachedPolicySet, PolicyDocument, PolicyRef, DEFAULT_ROLE_NAME, INVOCATION_ACCESS_POLICY,
    LOG_FULL_ACCESS_POLICY, NETWORK_INTERFACE_POLICY, REGISTRY_READ_ONLY_POLICY,
};
use crate::domain::service::{Declared, LogConfig, ServiceSpec};
use std::sync::Arc;
use tracing::{debug, info};

/// Everything role resolution looks at for one service.
#[derive(Debug, Clone, Copy)]
pub struct RoleRequest<'a> {
    pub service_name: &'a str,
    pub spec: &'a ServiceSpec,
    pub async_invocation: bool,
    pub custom_container: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedRole {
    /// Empty when the service needs no role
    pub arn: String,
    pub attached: AttachedPolicySet,
}

/// Which log policy a declaration calls for.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LogPolicy {
    Scoped { project: String, logstore: String },
    FullAccess,
    None,
}

impl LogPolicy {
    fn select(declared: &Declared<LogConfig>) -> Result<Self, ReconcileError> {
        match declared {
            Declared::Auto(_) => Ok(LogPolicy::FullAccess),
            Declared::Unset => Ok(LogPolicy::None),
            Declared::Explicit(config) => match (&config.project, &config.logstore) {
                (Some(project), Some(logstore)) => Ok(LogPolicy::Scoped {
                    project: project.clone(),
                    logstore: logstore.clone(),
                }),
                (None, None) => Ok(LogPolicy::None),
                (project, logstore) => Err(ReconcileError::IncompleteLogConfig {
                    project: project.clone(),
                    logstore: logstore.clone(),
                }),
            },
        }
    }
}

pub struct RoleResolver {
    identity: Arc<dyn IdentityClient>,
    region: String,
}

impl RoleResolver {
    pub fn new(identity: Arc<dyn IdentityClient>, region: impl Into<String>) -> Self {
        Self {
            identity,
            region: region.into(),
        }
    }

    pub async fn resolve(&self, request: RoleRequest<'_>) -> Result<ResolvedRole, ReconcileError> {
        let spec = request.spec;
        let log_policy = LogPolicy::select(&spec.log)?;

        if let Some(explicit) = &spec.role.explicit_ref {
            let role_name = extract_role_name(explicit)
                .ok_or_else(|| ReconcileError::InvalidRoleReference(explicit.clone()))?;
            debug!(
                "Using caller managed role '{}' for service {}",
                role_name, request.service_name
            );
            return Ok(ResolvedRole {
                arn: explicit.clone(),
                attached: AttachedPolicySet::new(),
            });
        }

        let role_name = self
            .identity
            .normalize_role_or_policy_name(DEFAULT_ROLE_NAME);
        let uses_network = spec.vpc.is_present() || spec.nas.is_present();

        // Async invocation and custom containers attach policies too, so they need the role
        let needs_role = spec.role.policies.is_some()
            || uses_network
            || spec.log.is_present()
            || request.async_invocation
            || request.custom_container;

        if !needs_role {
            return Ok(ResolvedRole::default());
        }

        info!("Making sure role '{}' exists", role_name);
        let role = self
            .identity
            .make_role(&role_name, true)
            .await
            .map_err(|e| ReconcileError::provisioning(format!("Make role {}", role_name), e))?;

        let mut attached = AttachedPolicySet::new();

        if let Some(policies) = &spec.role.policies {
            let mut counter = 1;
            for policy in policies {
                let (policy_name, next) = self
                    .attach_declared(request.service_name, &role_name, policy, counter)
                    .await?;
                attached.push(policy_name);
                counter = next;
            }
        }

        if request.async_invocation {
            self.attach(INVOCATION_ACCESS_POLICY, &role_name).await?;
            attached.push(INVOCATION_ACCESS_POLICY);

            let mns = self.generated_name("AliyunFcGeneratedMNSPolicy", request.service_name);
            let document = PolicyDocument::allow(["mns:SendMessage", "mns:PublishMessage"], "*");
            self.make_and_attach(&mns, &document, &role_name).await?;
        }

        if uses_network {
            self.attach(NETWORK_INTERFACE_POLICY, &role_name).await?;
            attached.push(NETWORK_INTERFACE_POLICY);
        }

        if request.custom_container {
            self.attach(REGISTRY_READ_ONLY_POLICY, &role_name).await?;
            attached.push(REGISTRY_READ_ONLY_POLICY);
        }

        match log_policy {
            LogPolicy::Scoped { project, logstore } => {
                let name = self.generated_name("AliyunFcGeneratedLogPolicy", request.service_name);
                let resource = format!("acs:log:*:*:project/{}/logstore/{}", project, logstore);
                let document = PolicyDocument::allow(["log:PostLogStoreLogs"], resource);
                self.make_and_attach(&name, &document, &role_name).await?;
            }
            LogPolicy::FullAccess => {
                self.attach(LOG_FULL_ACCESS_POLICY, &role_name).await?;
                attached.push(LOG_FULL_ACCESS_POLICY);
            }
            LogPolicy::None => {}
        }

        if !attached.is_empty() {
            info!("Attached policies {} to role: {}", attached, role_name);
        }

        Ok(ResolvedRole {
            arn: role.arn,
            attached,
        })
    }

    /// Attach one declared policy. Returns the attached name and the next
    /// inline counter; named policies leave the counter untouched.
    async fn attach_declared(
        &self,
        service_name: &str,
        role_name: &str,
        policy: &PolicyRef,
        counter: u32,
    ) -> Result<(String, u32), ReconcileError> {
        match policy {
            PolicyRef::Named(name) => {
                self.attach(name, role_name).await?;
                Ok((name.clone(), counter))
            }
            PolicyRef::Inline(document) => {
                let suffix = format!("{}{}", service_name, counter);
                let name = self.generated_name("AliyunFcGeneratedServicePolicy", &suffix);
                self.make_and_attach(&name, document, role_name).await?;
                Ok((name, counter + 1))
            }
        }
    }

    /// `{prefix}-{region}-{suffix}`, normalized for the identity service.
    fn generated_name(&self, prefix: &str, suffix: &str) -> String {
        let raw = format!("{}-{}-{}", prefix, self.region, suffix);
        self.identity.normalize_role_or_policy_name(&raw)
    }

    async fn attach(&self, policy_name: &str, role_name: &str) -> Result<(), ReconcileError> {
        let operation = format!("Attach policy {} to role {}", policy_name, role_name);
        self.identity
            .attach_policy_to_role(policy_name, role_name)
            .await
            .map_err(|e| ReconcileError::provisioning(operation, e))
    }

    async fn make_and_attach(
        &self,
        policy_name: &str,
        document: &PolicyDocument,
        role_name: &str,
    ) -> Result<(), ReconcileError> {
        let operation = format!("Make policy {} for role {}", policy_name, role_name);
        self.identity
            .make_and_attach_policy(policy_name, document, role_name)
            .await
            .map_err(|e| ReconcileError::provisioning(operation, e))
    }
}

/// Role name from an ARN such as `acs:ram::1234:role/demo`.
pub fn extract_role_name(arn: &str) -> Option<&str> {
    let path = arn.split(':').nth(4)?;
    let name = path.split('/').nth(1)?;
    (!name.is_empty()).then_some(name)
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use super::{Operation, SandboxPlatform, SandboxState, StoredRole};
use crate::domain::platform::{
    IdentityClient, PlatformError, RegistryClient, RegistryCredentials, Role,
};
use crate::domain::policy::PolicyDocument;
use async_trait::async_trait;

const ROLE_NOT_EXIST: &str = "EntityNotExist.Role";

fn role_not_found(role_name: &str) -> PlatformError {
    PlatformError::new(
        ROLE_NOT_EXIST,
        format!("role '{}' does not exist", role_name),
    )
}

fn attach(
    state: &mut SandboxState,
    policy_name: &str,
    role_name: &str,
) -> Result<(), PlatformError> {
    let role = state
        .roles
        .get_mut(role_name)
        .ok_or_else(|| role_not_found(role_name))?;
    if !role.policies.iter().any(|p| p == policy_name) {
        role.policies.push(policy_name.to_string());
    }
    Ok(())
}

#[async_trait]
impl IdentityClient for SandboxPlatform {
    async fn make_role(
        &self,
        role_name: &str,
        create_if_absent: bool,
    ) -> Result<Role, PlatformError> {
        let mut state = self.enter(Operation::MakeRole)?;
        if let Some(role) = state.roles.get(role_name) {
            return Ok(Role {
                role_name: role_name.to_string(),
                arn: role.arn.clone(),
            });
        }
        if !create_if_absent {
            return Err(role_not_found(role_name));
        }

        let arn = format!("acs:ram::{}:role/{}", self.account_id, role_name);
        state.roles.insert(
            role_name.to_string(),
            StoredRole {
                arn: arn.clone(),
                policies: Vec::new(),
            },
        );
        Ok(Role {
            role_name: role_name.to_string(),
            arn,
        })
    }

    async fn attach_policy_to_role(
        &self,
        policy_name: &str,
        role_name: &str,
    ) -> Result<(), PlatformError> {
        let mut state = self.enter(Operation::AttachPolicy)?;
        attach(&mut state, policy_name, role_name)
    }

    async fn make_and_attach_policy(
        &self,
        policy_name: &str,
        document: &PolicyDocument,
        role_name: &str,
    ) -> Result<(), PlatformError> {
        let mut state = self.enter(Operation::MakeAndAttachPolicy)?;
        state
            .policies
            .insert(policy_name.to_string(), document.clone());
        attach(&mut state, policy_name, role_name)
    }
}

#[async_trait]
impl RegistryClient for SandboxPlatform {
    async fn authorization_token(&self) -> Result<RegistryCredentials, PlatformError> {
        let _state = self.enter(Operation::AuthorizationToken)?;
        Ok(RegistryCredentials {
            user: "cr_temp_user".to_string(),
            password: uuid::Uuid::new_v4().to_string(),
        })
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool, PlatformError> {
        let state = self.enter(Operation::NamespaceExists)?;
        Ok(state.namespaces.contains_key(namespace))
    }

    async fn create_namespace(&self, namespace: &str) -> Result<Option<String>, PlatformError> {
        let mut state = self.enter(Operation::CreateNamespace)?;
        if state.settings.omit_namespace_ids {
            return Ok(None);
        }
        let id = format!("ns-{}", Self::short_id());
        state.namespaces.insert(namespace.to_string(), id.clone());
        Ok(Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_make_role_without_create_flag() {
        let platform = SandboxPlatform::new("1234", "cn-hangzhou");
        let err = platform.make_role("r", false).await.unwrap_err();
        assert!(err.has_code(ROLE_NOT_EXIST));

        let role = platform.make_role("r", true).await.unwrap();
        assert_eq!(role.arn, "acs:ram::1234:role/r");
        assert_eq!(platform.make_role("r", false).await.unwrap(), role);
    }

    #[tokio::test]
    async fn test_attaching_twice_is_noop() {
        let platform = SandboxPlatform::new("1234", "cn-hangzhou");
        platform.make_role("r", true).await.unwrap();
        platform.attach_policy_to_role("p", "r").await.unwrap();
        platform.attach_policy_to_role("p", "r").await.unwrap();

        assert_eq!(platform.role_policies("r"), vec!["p"]);
        let missing = platform.attach_policy_to_role("p", "missing").await;
        assert!(missing.is_err());
    }
}

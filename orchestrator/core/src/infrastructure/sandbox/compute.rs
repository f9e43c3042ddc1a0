// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use super::{Invocation, Operation, SandboxPlatform, SandboxState, StoredFunction};
use crate::domain::platform::{
    ComputeClient, FunctionDefinition, FunctionInfo, InvocationResponse, PlatformError,
    FUNCTION_NOT_FOUND, INVALID_ARGUMENT, LOG_RESULT_HEADER, LOG_TYPE_HEADER, SERVICE_NOT_FOUND,
};
use crate::domain::service::{ResolvedService, ServiceOptions};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use std::collections::BTreeMap;

fn service_not_found(service_name: &str) -> PlatformError {
    PlatformError::new(
        SERVICE_NOT_FOUND,
        format!("service '{}' does not exist", service_name),
    )
}

fn function_not_found(service_name: &str, function_name: &str) -> PlatformError {
    let message = format!(
        "function '{}' does not exist in service '{}'",
        function_name, service_name
    );
    PlatformError::new(FUNCTION_NOT_FOUND, message)
}

fn key(service_name: &str, function_name: &str) -> (String, String) {
    (service_name.to_string(), function_name.to_string())
}

impl SandboxPlatform {
    /// Reject writes referencing the default log project until it is visible.
    fn check_log_visibility(
        &self,
        state: &mut SandboxState,
        options: &ServiceOptions,
    ) -> Result<(), PlatformError> {
        let default = self.default_log_destination();
        if options.log_config.project == default.project && state.log_lag_remaining > 0 {
            state.log_lag_remaining -= 1;
            return Err(PlatformError::new(
                INVALID_ARGUMENT,
                format!("project '{}' does not exist", default.project),
            ));
        }
        Ok(())
    }

    fn function_info(function_name: &str, definition: &FunctionDefinition) -> FunctionInfo {
        FunctionInfo {
            function_name: function_name.to_string(),
            handler: definition.handler.clone(),
            runtime: definition.runtime.clone(),
            last_modified_time: Utc::now(),
        }
    }

    /// Run the directory check program: the payload is a JSON list of paths.
    fn run_directory_check(state: &mut SandboxState, payload: &str) -> (String, String) {
        let directories: Vec<String> = match serde_json::from_str(payload) {
            Ok(directories) => directories,
            Err(e) => return ("error".to_string(), format!("SyntaxError: {}", e)),
        };

        if state.settings.deny_nas_permissions {
            let first = directories.first().cloned().unwrap_or_default();
            return (
                r#"{"errorMessage":"EACCES"}"#.to_string(),
                format!("Error: EACCES: Permission denied, mkdir '{}'", first),
            );
        }

        let mut log = String::new();
        for directory in directories {
            log.push_str(&format!("directory ready: {}\n", directory));
            state.nas_directories.insert(directory);
        }
        ("OK".to_string(), log)
    }
}

#[async_trait]
impl ComputeClient for SandboxPlatform {
    async fn get_service(&self, service_name: &str) -> Result<ResolvedService, PlatformError> {
        let state = self.enter(Operation::GetService)?;
        state
            .services
            .get(service_name)
            .cloned()
            .ok_or_else(|| service_not_found(service_name))
    }

    async fn create_service(
        &self,
        service_name: &str,
        options: &ServiceOptions,
    ) -> Result<ResolvedService, PlatformError> {
        let mut state = self.enter(Operation::CreateService)?;
        if state.services.contains_key(service_name) {
            return Err(PlatformError::new(
                "ServiceAlreadyExists",
                format!("service '{}' already exists", service_name),
            ));
        }
        self.check_log_visibility(&mut state, options)?;

        let now = Utc::now();
        let service = ResolvedService {
            service_name: service_name.to_string(),
            service_id: uuid::Uuid::new_v4().to_string(),
            description: options.description.clone(),
            role: options.role.clone(),
            internet_access: options.internet_access,
            vpc_config: options.vpc_config.clone(),
            nas_config: options.nas_config.clone(),
            log_config: options.log_config.clone(),
            created_time: now,
            last_modified_time: now,
        };
        state
            .services
            .insert(service_name.to_string(), service.clone());
        Ok(service)
    }

    async fn update_service(
        &self,
        service_name: &str,
        options: &ServiceOptions,
    ) -> Result<ResolvedService, PlatformError> {
        let mut state = self.enter(Operation::UpdateService)?;
        if !state.services.contains_key(service_name) {
            return Err(service_not_found(service_name));
        }
        self.check_log_visibility(&mut state, options)?;

        let service = state
            .services
            .get_mut(service_name)
            .ok_or_else(|| service_not_found(service_name))?;
        service.description = options.description.clone();
        service.role = options.role.clone();
        if options.internet_access.is_some() {
            service.internet_access = options.internet_access;
        }
        service.vpc_config = options.vpc_config.clone();
        service.nas_config = options.nas_config.clone();
        service.log_config = options.log_config.clone();
        service.last_modified_time = Utc::now();
        Ok(service.clone())
    }

    async fn delete_service(&self, service_name: &str) -> Result<(), PlatformError> {
        let mut state = self.enter(Operation::DeleteService)?;
        let has_functions = state.functions.keys().any(|(s, _)| s == service_name);
        if has_functions {
            return Err(PlatformError::new(
                "ServiceNotEmpty",
                format!("service '{}' still has functions", service_name),
            ));
        }
        state
            .services
            .remove(service_name)
            .map(|_| ())
            .ok_or_else(|| service_not_found(service_name))
    }

    async fn get_function(
        &self,
        service_name: &str,
        function_name: &str,
    ) -> Result<FunctionInfo, PlatformError> {
        let state = self.enter(Operation::GetFunction)?;
        if !state.services.contains_key(service_name) {
            return Err(service_not_found(service_name));
        }
        state
            .functions
            .get(&key(service_name, function_name))
            .map(|f| f.info.clone())
            .ok_or_else(|| function_not_found(service_name, function_name))
    }

    async fn create_function(
        &self,
        service_name: &str,
        function_name: &str,
        definition: &FunctionDefinition,
    ) -> Result<FunctionInfo, PlatformError> {
        let mut state = self.enter(Operation::CreateFunction)?;
        if !state.services.contains_key(service_name) {
            return Err(service_not_found(service_name));
        }
        let k = key(service_name, function_name);
        if state.functions.contains_key(&k) {
            return Err(PlatformError::new(
                "FunctionAlreadyExists",
                format!("function '{}' already exists", function_name),
            ));
        }
        let info = Self::function_info(function_name, definition);
        state.functions.insert(
            k,
            StoredFunction {
                definition: definition.clone(),
                info: info.clone(),
            },
        );
        Ok(info)
    }

    async fn update_function(
        &self,
        service_name: &str,
        function_name: &str,
        definition: &FunctionDefinition,
    ) -> Result<FunctionInfo, PlatformError> {
        let mut state = self.enter(Operation::UpdateFunction)?;
        let stored = state
            .functions
            .get_mut(&key(service_name, function_name))
            .ok_or_else(|| function_not_found(service_name, function_name))?;
        stored.definition = definition.clone();
        stored.info = Self::function_info(function_name, definition);
        Ok(stored.info.clone())
    }

    async fn delete_function(
        &self,
        service_name: &str,
        function_name: &str,
    ) -> Result<(), PlatformError> {
        let mut state = self.enter(Operation::DeleteFunction)?;
        let k = key(service_name, function_name);
        state.triggers.remove(&k);
        state
            .functions
            .remove(&k)
            .map(|_| ())
            .ok_or_else(|| function_not_found(service_name, function_name))
    }

    async fn invoke_function(
        &self,
        service_name: &str,
        function_name: &str,
        payload: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<InvocationResponse, PlatformError> {
        let mut state = self.enter(Operation::InvokeFunction)?;
        let k = key(service_name, function_name);
        if !state.functions.contains_key(&k) {
            return Err(function_not_found(service_name, function_name));
        }

        state.invocations.push(Invocation {
            service_name: service_name.to_string(),
            function_name: function_name.to_string(),
            payload: payload.to_string(),
            headers: headers.clone(),
        });

        let (body, log) = Self::run_directory_check(&mut state, payload);

        let wants_tail = headers
            .iter()
            .any(|(k, v)| k.eq_ignore_ascii_case(LOG_TYPE_HEADER) && v == "Tail");
        let mut response_headers = BTreeMap::new();
        if wants_tail && !state.settings.suppress_invocation_logs {
            response_headers.insert(LOG_RESULT_HEADER.to_string(), STANDARD.encode(log));
        }

        Ok(InvocationResponse {
            body,
            headers: response_headers,
        })
    }

    async fn list_triggers(
        &self,
        service_name: &str,
        function_name: &str,
    ) -> Result<Vec<String>, PlatformError> {
        let state = self.enter(Operation::ListTriggers)?;
        let k = key(service_name, function_name);
        if !state.functions.contains_key(&k) {
            return Err(function_not_found(service_name, function_name));
        }
        Ok(state.triggers.get(&k).cloned().unwrap_or_default())
    }

    async fn delete_trigger(
        &self,
        service_name: &str,
        function_name: &str,
        trigger_name: &str,
    ) -> Result<(), PlatformError> {
        let mut state = self.enter(Operation::DeleteTrigger)?;
        let triggers = state
            .triggers
            .get_mut(&key(service_name, function_name))
            .ok_or_else(|| PlatformError::new("TriggerNotFound", trigger_name))?;
        let before = triggers.len();
        triggers.retain(|t| t != trigger_name);
        if triggers.len() == before {
            return Err(PlatformError::new(
                "TriggerNotFound",
                format!("trigger '{}' does not exist", trigger_name),
            ));
        }
        Ok(())
    }

    async fn get_resource_tags(
        &self,
        resource_arn: &str,
    ) -> Result<BTreeMap<String, String>, PlatformError> {
        let state = self.enter(Operation::GetResourceTags)?;
        Ok(state.tags.get(resource_arn).cloned().unwrap_or_default())
    }

    async fn tag_resource(
        &self,
        resource_arn: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), PlatformError> {
        let mut state = self.enter(Operation::TagResource)?;
        state
            .tags
            .entry(resource_arn.to_string())
            .or_default()
            .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn untag_resource(
        &self,
        resource_arn: &str,
        keys: &[String],
    ) -> Result<(), PlatformError> {
        let mut state = self.enter(Operation::UntagResource)?;
        if let Some(tags) = state.tags.get_mut(resource_arn) {
            tags.retain(|k, _| !keys.contains(k));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::platform::FunctionCode;

    fn definition() -> FunctionDefinition {
        FunctionDefinition {
            description: String::new(),
            handler: "index.handler".to_string(),
            initializer: String::new(),
            timeout: 60,
            memory_size: 128,
            runtime: "nodejs12".to_string(),
            code: FunctionCode::default(),
        }
    }

    /// Service `svc` holding function `fn`.
    async fn with_function(platform: &SandboxPlatform) {
        let options = ServiceOptions::default();
        let definition = definition();
        platform.create_service("svc", &options).await.unwrap();
        platform
            .create_function("svc", "fn", &definition)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_function_requires_service() {
        let platform = SandboxPlatform::new("1234", "cn-hangzhou");
        let definition = definition();
        let err = platform.create_function("svc", "fn", &definition).await;
        assert!(err.unwrap_err().has_code(SERVICE_NOT_FOUND));

        with_function(&platform).await;
        assert!(platform.get_function("svc", "fn").await.is_ok());
        let err = platform.get_function("svc", "other").await.unwrap_err();
        assert!(err.has_code(FUNCTION_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_service_with_functions_cannot_be_deleted() {
        let platform = SandboxPlatform::new("1234", "cn-hangzhou");
        with_function(&platform).await;

        let err = platform.delete_service("svc").await.unwrap_err();
        assert!(err.has_code("ServiceNotEmpty"));
        platform.delete_function("svc", "fn").await.unwrap();
        platform.delete_service("svc").await.unwrap();
    }

    #[tokio::test]
    async fn test_update_keeps_identity() {
        let platform = SandboxPlatform::new("1234", "cn-hangzhou");
        let defaults = ServiceOptions::default();
        let created = platform.create_service("svc", &defaults).await.unwrap();
        let options = ServiceOptions {
            description: Some("changed".to_string()),
            ..Default::default()
        };
        let updated = platform.update_service("svc", &options).await.unwrap();

        assert_eq!(created.service_id, updated.service_id);
        assert_eq!(created.created_time, updated.created_time);
        assert_eq!(updated.description.as_deref(), Some("changed"));
    }

    #[tokio::test]
    async fn test_invocation_log_tail_only_when_requested() {
        let platform = SandboxPlatform::new("1234", "cn-hangzhou");
        with_function(&platform).await;

        let plain = platform
            .invoke_function("svc", "fn", r#"["/mnt/a"]"#, &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(plain.body, "OK");
        assert!(plain.header(LOG_RESULT_HEADER).is_none());

        let mut headers = BTreeMap::new();
        headers.insert("X-Fc-Log-Type".to_string(), "Tail".to_string());
        let tailed = platform
            .invoke_function("svc", "fn", r#"["/mnt/b"]"#, &headers)
            .await
            .unwrap();
        let encoded = tailed.header(LOG_RESULT_HEADER).unwrap();
        let log = STANDARD.decode(encoded).unwrap();
        assert!(String::from_utf8(log).unwrap().contains("/mnt/b"));
        assert_eq!(platform.nas_directories().len(), 2);
    }
}

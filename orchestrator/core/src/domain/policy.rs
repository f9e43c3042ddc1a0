// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Identity policy value objects
//!
//! Policy documents attached to the execution role, the caller-facing policy
//! reference (a managed policy name or an inline document) and the naming
//! rules for generated policies.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// Role created when the caller does not bring one.
pub const DEFAULT_ROLE_NAME: &str = "ServerlessToolDefaultRole";

pub const INVOCATION_ACCESS_POLICY: &str = "AliyunFCInvocationAccess";
pub const NETWORK_INTERFACE_POLICY: &str = "AliyunECSNetworkInterfaceManagementAccess";
pub const REGISTRY_READ_ONLY_POLICY: &str = "AliyunContainerRegistryReadOnlyAccess";
pub const LOG_FULL_ACCESS_POLICY: &str = "AliyunLogFullAccess";

/// Platform limit on role and policy names.
pub const MAX_NAME_LEN: usize = 64;
const HASH_SUFFIX_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<PolicyStatement>,
}

impl PolicyDocument {
    /// Single `Allow` statement over the given actions and resource.
    pub fn allow<I, S>(actions: I, resource: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            version: "1".to_string(),
            statement: vec![PolicyStatement {
                effect: "Allow".to_string(),
                action: actions.into_iter().map(Into::into).collect(),
                resource: vec![resource.into()],
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    pub effect: String,
    #[serde(deserialize_with = "one_or_many::deserialize")]
    pub action: Vec<String>,
    #[serde(
        deserialize_with = "one_or_many::deserialize",
        serialize_with = "one_or_many::serialize"
    )]
    pub resource: Vec<String>,
}

/// A policy declared on a role: a managed policy by name, or an inline document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PolicyRef {
    Named(String),
    Inline(PolicyDocument),
}

/// Policies attached during one role resolution pass, in attachment order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachedPolicySet(Vec<String>);

impl AttachedPolicySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>) {
        self.0.push(name.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for AttachedPolicySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// Normalise a raw role or policy name to the platform's naming rules.
///
/// Underscores become dashes and anything outside `[A-Za-z0-9.-]` is
/// dropped. Names over [`MAX_NAME_LEN`] are cut and suffixed with a digest of
/// the raw name so two long names sharing a prefix stay distinct.
pub fn normalize_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c == '_' { '-' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '.')
        .collect();

    if cleaned.len() <= MAX_NAME_LEN {
        return cleaned;
    }

    let digest = hex::encode(Sha256::digest(raw.as_bytes()));
    let keep = MAX_NAME_LEN - HASH_SUFFIX_LEN - 1;
    format!("{}-{}", &cleaned[..keep], &digest[..HASH_SUFFIX_LEN])
}

/// Accepts either a single value or a list for the same field.
pub(crate) mod one_or_many {
    use super::*;
    use serde::de::DeserializeOwned;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        One(T),
        Many(Vec<T>),
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(match OneOrMany::<T>::deserialize(deserializer)? {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        })
    }

    pub fn serialize<S, T>(values: &[T], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        match values {
            [single] => single.serialize(serializer),
            many => many.serialize(serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_replaces_underscores() {
        assert_eq!(
            normalize_name("AliyunFcGeneratedLogPolicy-cn-hangzhou-my_service"),
            "AliyunFcGeneratedLogPolicy-cn-hangzhou-my-service"
        );
    }

    #[test]
    fn test_normalize_long_names_stay_distinct() {
        let base = "AliyunFcGeneratedServicePolicy-cn-hangzhou-".to_string() + &"a".repeat(40);
        let first = normalize_name(&(base.clone() + "1"));
        let second = normalize_name(&(base.clone() + "2"));

        assert_eq!(first.len(), MAX_NAME_LEN);
        assert_eq!(second.len(), MAX_NAME_LEN);
        assert_ne!(first, second);
        // Deterministic
        assert_eq!(first, normalize_name(&(base + "1")));
    }

    #[test]
    fn test_policy_ref_parses_both_forms() {
        let yaml = r#"
- AliyunOSSReadOnlyAccess
- Version: '1'
  Statement:
    - Effect: Allow
      Action: oss:GetObject
      Resource: '*'
"#;
        let policies: Vec<PolicyRef> = serde_yaml::from_str(yaml).unwrap();
        let named = PolicyRef::Named("AliyunOSSReadOnlyAccess".to_string());
        assert_eq!(policies[0], named);
        match &policies[1] {
            PolicyRef::Inline(doc) => {
                assert_eq!(doc.statement[0].action, vec!["oss:GetObject".to_string()]);
                assert_eq!(doc.statement[0].resource, vec!["*".to_string()]);
            }
            other => panic!("expected inline policy, got {:?}", other),
        }
    }

    #[test]
    fn test_single_resource_serializes_as_string() {
        let resource = "acs:log:*:*:project/p/logstore/l";
        let doc = PolicyDocument::allow(["log:PostLogStoreLogs"], resource);
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["Statement"][0]["Resource"], resource);
        assert_eq!(json["Statement"][0]["Action"][0], "log:PostLogStoreLogs");
    }
}

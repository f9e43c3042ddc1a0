// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Service Domain Model
//!
//! Two shapes live side by side here:
//!
//! - **Tool shape**: what a caller writes in a service manifest (PascalCase
//!   keys, `Auto` sentinels, optional fields).
//! - **Platform shape**: what the compute API expects on create/update and
//!   returns on read (camelCase keys, every field concrete).
//!
//! Dependent declarations (`Vpc`, `Nas`, `Log`) are a closed [`Declared`]
//! variant so the engine never compares sentinel strings.

use crate::domain::policy::PolicyRef;
use chrono::{DateTime, Utc};
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sentinel user/group id meaning "not configured".
pub const UNSET_OWNER_ID: i32 = -1;

// ============================================================================
// Declarations
// ============================================================================

/// Ownership hints that may accompany an `Auto` declaration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AutoHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i32>,
}

/// A dependent-resource declaration: absent, auto-provisioned or explicit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Declared<T> {
    #[default]
    Unset,
    Auto(AutoHints),
    Explicit(T),
}

/// Configuration sections that can be declared but empty.
pub trait ConfigSection {
    fn is_empty(&self) -> bool;
}

impl<T> Declared<T> {
    pub fn is_unset(&self) -> bool {
        matches!(self, Declared::Unset)
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, Declared::Auto(_))
    }

    pub fn explicit(&self) -> Option<&T> {
        match self {
            Declared::Explicit(value) => Some(value),
            _ => None,
        }
    }

    pub fn auto_hints(&self) -> Option<AutoHints> {
        match self {
            Declared::Auto(hints) => Some(*hints),
            _ => None,
        }
    }
}

impl<T: ConfigSection> Declared<T> {
    /// `Auto`, or an explicit section with at least one field set.
    pub fn is_present(&self) -> bool {
        match self {
            Declared::Unset => false,
            Declared::Auto(_) => true,
            Declared::Explicit(value) => !value.is_empty(),
        }
    }
}

impl<T: DeserializeOwned> Declared<T> {
    fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        match value {
            Value::Null => Ok(Declared::Unset),
            Value::String(s) if s.eq_ignore_ascii_case("auto") => {
                Ok(Declared::Auto(AutoHints::default()))
            }
            Value::String(s) => Err(de::Error::custom(format!(
                "unsupported value '{}', expected 'Auto' or a mapping",
                s
            ))),
            Value::Object(ref map)
                if map
                    .get("Type")
                    .and_then(Value::as_str)
                    .is_some_and(|t| t.eq_ignore_ascii_case("auto")) =>
            {
                Ok(Declared::Auto(serde_json::from_value(value)?))
            }
            other => Ok(Declared::Explicit(serde_json::from_value(other)?)),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Declared<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Declared::from_value(value).map_err(de::Error::custom)
    }
}

impl<T: Serialize> Serialize for Declared<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Declared::Unset => serializer.serialize_none(),
            Declared::Auto(hints) if *hints == AutoHints::default() => {
                serializer.serialize_str("Auto")
            }
            Declared::Auto(hints) => {
                let value = serde_json::to_value(hints);
                let mut value = value.map_err(serde::ser::Error::custom)?;
                if let Value::Object(map) = &mut value {
                    map.insert("Type".to_string(), Value::String("Auto".to_string()));
                }
                value.serialize(serializer)
            }
            Declared::Explicit(inner) => inner.serialize(serializer),
        }
    }
}

// ============================================================================
// Tool shape
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(rename = "VpcId", default, skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
    #[serde(rename = "VSwitchIds", default, skip_serializing_if = "Vec::is_empty")]
    pub vswitch_ids: Vec<String>,
    #[serde(
        rename = "SecurityGroupId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub security_group_id: Option<String>,
}

impl ConfigSection for NetworkConfig {
    fn is_empty(&self) -> bool {
        self.vpc_id.is_none() && self.vswitch_ids.is_empty() && self.security_group_id.is_none()
    }
}

/// One mount as written by the caller.
///
/// `ServerAddr` is either the full `domain:/remote/dir` address, or just the
/// domain with the remote directory given separately in `NasDir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolMountPoint {
    #[serde(rename = "ServerAddr")]
    pub server_addr: String,
    #[serde(rename = "NasDir", default, skip_serializing_if = "Option::is_none")]
    pub nas_dir: Option<String>,
    #[serde(rename = "MountDir", alias = "FcDir")]
    pub mount_dir: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FilesystemConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mount_points: Vec<ToolMountPoint>,
}

impl ConfigSection for FilesystemConfig {
    fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.group_id.is_none() && self.mount_points.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(rename = "Project", default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(rename = "LogStore", default, skip_serializing_if = "Option::is_none")]
    pub logstore: Option<String>,
}

impl ConfigSection for LogConfig {
    fn is_empty(&self) -> bool {
        self.project.is_none() && self.logstore.is_none()
    }
}

/// Execution role declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoleSpec {
    /// Caller-managed role ARN. When set, no role or policy is touched.
    #[serde(rename = "Name", default, skip_serializing_if = "Option::is_none")]
    pub explicit_ref: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_policies",
        skip_serializing_if = "Option::is_none"
    )]
    pub policies: Option<Vec<PolicyRef>>,
}

fn deserialize_policies<'de, D>(deserializer: D) -> Result<Option<Vec<PolicyRef>>, D::Error>
where
    D: Deserializer<'de>,
{
    crate::domain::policy::one_or_many::deserialize(deserializer).map(Some)
}

/// Everything the caller declares about one service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `None` leaves the decision to the platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internet_access: Option<bool>,
    #[serde(default, skip_serializing_if = "Declared::is_unset")]
    pub vpc: Declared<NetworkConfig>,
    #[serde(default, skip_serializing_if = "Declared::is_unset")]
    pub nas: Declared<FilesystemConfig>,
    #[serde(default, skip_serializing_if = "Declared::is_unset")]
    pub log: Declared<LogConfig>,
    #[serde(default)]
    pub role: RoleSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default)]
    pub value: String,
}

/// A deployable unit: a named service plus the capabilities its functions need.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceManifest {
    pub service_name: String,
    #[serde(default)]
    pub properties: ServiceSpec,
    #[serde(default)]
    pub async_invocation: bool,
    #[serde(default)]
    pub custom_container: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

impl ServiceManifest {
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }
}

// ============================================================================
// Platform shape
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpcAttachment {
    pub vpc_id: String,
    pub vswitch_ids: Vec<String>,
    pub security_group_id: String,
}

impl From<&NetworkConfig> for VpcAttachment {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            vpc_id: config.vpc_id.clone().unwrap_or_default(),
            vswitch_ids: config.vswitch_ids.clone(),
            security_group_id: config.security_group_id.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NasMountPoint {
    pub server_addr: String,
    pub mount_dir: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NasAttachment {
    pub user_id: i32,
    pub group_id: i32,
    pub mount_points: Vec<NasMountPoint>,
}

impl Default for NasAttachment {
    fn default() -> Self {
        Self {
            user_id: UNSET_OWNER_ID,
            group_id: UNSET_OWNER_ID,
            mount_points: Vec::new(),
        }
    }
}

impl NasAttachment {
    pub fn has_mount_points(&self) -> bool {
        !self.mount_points.is_empty()
    }
}

impl From<&FilesystemConfig> for NasAttachment {
    fn from(config: &FilesystemConfig) -> Self {
        let mount_points = config
            .mount_points
            .iter()
            .map(|mp| NasMountPoint {
                server_addr: match &mp.nas_dir {
                    Some(dir) => format!("{}:{}", mp.server_addr, dir),
                    None => mp.server_addr.clone(),
                },
                mount_dir: mp.mount_dir.clone(),
            })
            .collect();

        Self {
            user_id: config.user_id.unwrap_or(UNSET_OWNER_ID),
            group_id: config.group_id.unwrap_or(UNSET_OWNER_ID),
            mount_points,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogDestination {
    pub project: String,
    pub logstore: String,
}

/// Fully resolved create/update payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub role: String,
    pub log_config: LogDestination,
    pub vpc_config: VpcAttachment,
    pub nas_config: NasAttachment,
    /// Omitted entirely when unspecified so the platform default applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internet_access: Option<bool>,
}

/// Live representation of a service as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedService {
    pub service_name: String,
    pub service_id: String,
    #[serde(default)]
    pub description: Option<String>,
    pub role: String,
    #[serde(default)]
    pub internet_access: Option<bool>,
    pub vpc_config: VpcAttachment,
    pub nas_config: NasAttachment,
    pub log_config: LogDestination,
    pub created_time: DateTime<Utc>,
    pub last_modified_time: DateTime<Utc>,
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Resource tagging

use crate::domain::errors::ReconcileError;
use crate::domain::platform::ComputeClient;
use crate::domain::service::Tag;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

pub struct TagManager {
    compute: Arc<dyn ComputeClient>,
}

impl TagManager {
    pub fn new(compute: Arc<dyn ComputeClient>) -> Self {
        Self { compute }
    }

    /// Apply `tags` to a resource, or only the tag named `tag_name`.
    ///
    /// Entries without a key are ignored. Returns the tags that were applied.
    pub async fn deploy(
        &self,
        resource_arn: &str,
        tags: &[Tag],
        tag_name: Option<&str>,
    ) -> Result<BTreeMap<String, String>, ReconcileError> {
        if tags.is_empty() {
            return Ok(BTreeMap::new());
        }

        let mut wanted: BTreeMap<String, String> = tags
            .iter()
            .filter_map(|tag| tag.key.clone().map(|key| (key, tag.value.clone())))
            .collect();

        if let Some(name) = tag_name {
            let value = wanted
                .remove(name)
                .ok_or_else(|| ReconcileError::TagNotFound(name.to_string()))?;
            wanted = BTreeMap::from([(name.to_string(), value)]);
        }

        let keys: Vec<&String> = wanted.keys().collect();
        info!("Tagging resource {} with {:?}", resource_arn, keys);
        self.compute
            .tag_resource(resource_arn, &wanted)
            .await
            .map_err(|e| {
                let operation = format!("Tag resource {}", resource_arn);
                ReconcileError::provisioning(operation, e)
            })?;

        Ok(wanted)
    }

    /// Remove one tag by key, or every tag on the resource when `key` is `None`.
    ///
    /// Returns the keys that were removed.
    pub async fn remove(
        &self,
        resource_arn: &str,
        key: Option<&str>,
    ) -> Result<Vec<String>, ReconcileError> {
        let keys = match key {
            Some(key) => vec![key.to_string()],
            None => self
                .compute
                .get_resource_tags(resource_arn)
                .await
                .map_err(|e| ReconcileError::provisioning("Unable to get tags", e))?
                .into_keys()
                .collect(),
        };

        if keys.is_empty() {
            info!("No tags on {}, skip deleting", resource_arn);
            return Ok(keys);
        }

        info!("Untagging resource {}: {:?}", resource_arn, keys);
        self.compute
            .untag_resource(resource_arn, &keys)
            .await
            .map_err(|e| {
                let operation = format!("Untag resource {}", resource_arn);
                ReconcileError::provisioning(operation, e)
            })?;

        Ok(keys)
    }
}

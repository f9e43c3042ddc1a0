// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod sandbox;

use crate::domain::deploy_config::BackendKind;
use crate::domain::platform::PlatformClientFactory;
use std::sync::Arc;

pub use sandbox::{SandboxClientFactory, SandboxPlatform};

/// Factory function to create the platform client factory for a backend
pub fn create_client_factory(backend: BackendKind) -> Arc<dyn PlatformClientFactory> {
    match backend {
        BackendKind::Sandbox => Arc::new(SandboxClientFactory),
    }
}

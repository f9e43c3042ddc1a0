// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer
//!
//! Declarations as callers write them, the platform shapes they resolve to,
//! and the collaborator contracts the engine depends on.

pub mod deploy_config;
pub mod errors;
pub mod mount_point;
pub mod platform;
pub mod policy;
pub mod service;

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! svcforge core
//!
//! Reconciliation engine for serverless function services: resolves the
//! execution role, provisions `Auto` dependencies, converges the service
//! through the platform's eventual consistency and makes sure mounted nas
//! directories exist.
//!
//! # Architecture
//!
//! - **domain:** service declarations, platform collaborator traits, errors, configuration
//! - **application:** the reconciliation stages and the [`application::ServiceDeployer`] facade
//! - **infrastructure:** platform backends (in-memory sandbox)

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;

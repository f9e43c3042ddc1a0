// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for svcforge CLI

pub mod config;
pub mod registry;
pub mod service;
pub mod tags;

pub use self::config::ConfigCommand;
pub use self::registry::RegistryCommand;
pub use self::service::ServiceCommand;
pub use self::tags::TagsCommand;

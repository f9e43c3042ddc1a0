// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod convergence;
pub mod dependents;
pub mod deployer;
pub mod nas_directory;
pub mod registry;
pub mod retry;
pub mod role;
pub mod tags;
pub mod teardown;

pub use deployer::ServiceDeployer;
pub use registry::RegistryService;
pub use tags::TagManager;
pub use teardown::{TeardownFailure, TeardownReport};

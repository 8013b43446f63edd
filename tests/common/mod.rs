//! Common test utilities for Stevedore CLI tests.
//!
//! This module provides:
//! - `TestEnv`: Isolated test environment with a temp project directory
//! - Fixtures: Reusable descriptor/manifest/handler content constants

pub mod env;
pub mod fixtures;

pub use env::*;
pub use fixtures::*;

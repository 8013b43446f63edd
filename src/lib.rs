//! Stevedore - declarative container-style build and launch tool
//!
//! Stevedore reads a build descriptor (`stevedore.toml`) and executes the
//! image contract it declares: install system packages, mirror the build
//! context into a working directory, install the dependency manifest, and
//! launch the entrypoint process with its exit code propagated 1:1. Build
//! steps run strictly in order, fail fast, and commit an immutable layer
//! ledger once all of them succeed.

pub mod build;
pub mod check;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod launch;
pub mod layer;
pub mod manifest;
pub mod runner;
pub mod watcher;

// Re-exports for convenience
pub use build::{BuildEngine, BuildEvent, BuildOptions, BuildOutcome, BuildPlan, Step};
pub use check::{run_checks, Check, CheckReport, CheckStatus};
pub use context::{materialize, snapshot, ContextSnapshot};
pub use descriptor::{Descriptor, DescriptorWarning, DESCRIPTOR_FILE};
pub use error::{StevedoreError, StevedoreResult};
pub use launch::Entrypoint;
pub use layer::{Layer, LayerKind, Ledger, LEDGER_FILE};
pub use manifest::{Manifest, Specifier};
pub use runner::{CommandRunner, Invocation, SystemRunner};
pub use watcher::{watch, WatchEvent, WatchOptions};

//! Error types for Stevedore
//!
//! Uses `thiserror` for library errors. Build errors are fail-fast: any
//! variant raised during a build aborts it and no ledger is committed.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Stevedore operations
pub type StevedoreResult<T> = Result<T, StevedoreError>;

/// Main error type for Stevedore operations
#[derive(Error, Debug)]
pub enum StevedoreError {
    /// Descriptor file missing
    #[error("descriptor not found: {path}")]
    DescriptorNotFound { path: PathBuf },

    /// Invalid descriptor TOML
    #[error("invalid descriptor {file}: {message}")]
    InvalidDescriptor { file: PathBuf, message: String },

    /// Base image reference is not version-pinned
    #[error("base image '{image}' is not pinned - use an explicit tag (not 'latest')")]
    UnpinnedBase { image: String },

    /// Build context directory missing
    #[error("build context not found: {path}")]
    ContextNotFound { path: PathBuf },

    /// Dependency manifest missing
    #[error("dependency manifest not found: {path}")]
    ManifestNotFound { path: PathBuf },

    /// Invalid dependency specifier
    #[error("invalid specifier '{spec}' in {file}:{line}: {reason}")]
    InvalidSpecifier {
        spec: String,
        file: PathBuf,
        line: usize,
        reason: String,
    },

    /// Two specifiers pin the same package to different versions
    #[error("conflicting pins for '{name}' in {file}: {first} vs {second}")]
    ConflictingSpecifier {
        name: String,
        file: PathBuf,
        first: String,
        second: String,
    },

    /// A build step's command exited non-zero
    #[error("build step '{step}' failed: {command} exited with status {status}")]
    StepFailed {
        step: String,
        command: String,
        status: i32,
    },

    /// A build step's command could not be spawned at all
    #[error("build step '{step}' failed to launch '{command}': {source}")]
    StepSpawn {
        step: String,
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Symlink or entry resolves outside the build context
    #[error("path '{path}' escapes build context '{root}'")]
    ContextEscape { path: PathBuf, root: PathBuf },

    /// Working directory would resolve outside the image root
    #[error("workdir '{workdir}' escapes the image root")]
    WorkdirEscape { workdir: PathBuf },

    /// Entrypoint script missing from the materialized workspace
    #[error("entrypoint script not found: {path}")]
    EntrypointMissing { path: PathBuf },

    /// Could not spawn the entrypoint process
    #[error("failed to launch entrypoint '{command}': {source}")]
    LaunchFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Another build holds the ledger lock
    #[error("another build is in progress (ledger locked): {path}")]
    LedgerLocked { path: PathBuf },

    /// Corrupt or unreadable ledger
    #[error("invalid ledger {file}: {message}")]
    InvalidLedger { file: PathBuf, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_error_display_invalid_specifier() {
        let err = StevedoreError::InvalidSpecifier {
            spec: "==1.0".to_string(),
            file: PathBuf::from("requirements.txt"),
            line: 4,
            reason: "missing package name".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid specifier '==1.0' in requirements.txt:4: missing package name"
        );
    }

    #[test]
    fn test_error_display_step_failed() {
        let err = StevedoreError::StepFailed {
            step: "system-packages".to_string(),
            command: "apt-get install -y ffmpeg".to_string(),
            status: 100,
        };
        assert_eq!(
            err.to_string(),
            "build step 'system-packages' failed: apt-get install -y ffmpeg exited with status 100"
        );
    }

    #[test]
    fn test_error_display_unpinned_base() {
        let err = StevedoreError::UnpinnedBase {
            image: "python:latest".to_string(),
        };
        assert!(err.to_string().contains("not pinned"));
    }
}

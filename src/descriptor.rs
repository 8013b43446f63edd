//! Build descriptor for Stevedore
//!
//! The descriptor (`stevedore.toml`) is the declarative contract for the
//! whole pipeline:
//! 1. `[base]` - pinned base runtime image reference
//! 2. `[system]` - OS package list installed before anything else
//! 3. `[workspace]` - build context copied into the image working directory
//! 4. `[dependencies]` - flat manifest installed into the interpreter env
//! 5. `[entrypoint]` - the single process the built image runs on start
//!
//! Unknown keys are surfaced as non-fatal warnings. `STEVEDORE_*` environment
//! variables override selected fields.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{StevedoreError, StevedoreResult};

/// Default descriptor file name
pub const DESCRIPTOR_FILE: &str = "stevedore.toml";

/// Project-local state directory, never part of the build context
pub const STATE_DIR: &str = ".stevedore";

/// Base runtime image configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseConfig {
    /// Version-pinned image reference, e.g. "python:3.11-slim"
    #[serde(default = "default_base_image")]
    pub image: String,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            image: default_base_image(),
        }
    }
}

fn default_base_image() -> String {
    "python:3.11-slim".to_string()
}

/// System (OS-level) package configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Package names handed to the system package manager
    #[serde(default)]
    pub packages: Vec<String>,

    /// Package manager program (apt-get, apk, dnf, ...)
    #[serde(default = "default_manager")]
    pub manager: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            packages: Vec::new(),
            manager: default_manager(),
        }
    }
}

fn default_manager() -> String {
    "apt-get".to_string()
}

/// Workspace (build context) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Build context directory, relative to the descriptor
    #[serde(default = "default_context")]
    pub context: PathBuf,

    /// Destination working directory inside the image root
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            context: default_context(),
            workdir: default_workdir(),
        }
    }
}

fn default_context() -> PathBuf {
    PathBuf::from(".")
}

fn default_workdir() -> PathBuf {
    PathBuf::from("app")
}

/// Dependency installer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependenciesConfig {
    /// Flat manifest file, relative to the build context
    #[serde(default = "default_manifest")]
    pub manifest: PathBuf,

    /// Installer program
    #[serde(default = "default_installer")]
    pub installer: String,
}

impl Default for DependenciesConfig {
    fn default() -> Self {
        Self {
            manifest: default_manifest(),
            installer: default_installer(),
        }
    }
}

fn default_manifest() -> PathBuf {
    PathBuf::from("requirements.txt")
}

fn default_installer() -> String {
    "pip".to_string()
}

/// Entrypoint process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrypointConfig {
    /// Interpreter program
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Script path, relative to the working directory
    #[serde(default = "default_script")]
    pub script: PathBuf,

    /// Pass `-u` so standard streams are unbuffered
    #[serde(default = "default_true")]
    pub unbuffered: bool,
}

impl Default for EntrypointConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            script: default_script(),
            unbuffered: true,
        }
    }
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_script() -> PathBuf {
    PathBuf::from("handler.py")
}

fn default_true() -> bool {
    true
}

/// Non-fatal descriptor warning surfaced to CLI users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorWarning {
    pub key: String,
    pub file: PathBuf,
}

/// Main build descriptor structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Descriptor {
    #[serde(default)]
    pub base: BaseConfig,

    #[serde(default)]
    pub system: SystemConfig,

    #[serde(default)]
    pub workspace: WorkspaceConfig,

    #[serde(default)]
    pub dependencies: DependenciesConfig,

    #[serde(default)]
    pub entrypoint: EntrypointConfig,
}

impl Descriptor {
    /// Load a descriptor from a TOML file
    pub fn load(path: &Path) -> StevedoreResult<Self> {
        let (descriptor, _warnings) = Self::load_with_warnings(path)?;
        Ok(descriptor)
    }

    /// Load a descriptor and collect non-fatal warnings (unknown keys).
    pub fn load_with_warnings(path: &Path) -> StevedoreResult<(Self, Vec<DescriptorWarning>)> {
        if !path.exists() {
            return Err(StevedoreError::DescriptorNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = fs::read_to_string(path)?;

        let mut unknown_paths: Vec<String> = Vec::new();
        let deserializer = toml::de::Deserializer::new(&content);

        let descriptor: Self = serde_ignored::deserialize(deserializer, |ignored| {
            unknown_paths.push(ignored.to_string());
        })
        .map_err(|e| StevedoreError::InvalidDescriptor {
            file: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let warnings = unknown_paths
            .into_iter()
            .map(|key| DescriptorWarning {
                key,
                file: path.to_path_buf(),
            })
            .collect();

        Ok((descriptor.with_env_overrides(), warnings))
    }

    /// Apply environment variable overrides (STEVEDORE_* prefix)
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(image) = std::env::var("STEVEDORE_BASE_IMAGE") {
            if !image.is_empty() {
                self.base.image = image;
            }
        }
        if let Ok(manager) = std::env::var("STEVEDORE_SYSTEM_MANAGER") {
            if !manager.is_empty() {
                self.system.manager = manager;
            }
        }
        if let Ok(installer) = std::env::var("STEVEDORE_INSTALLER") {
            if !installer.is_empty() {
                self.dependencies.installer = installer;
            }
        }
        self
    }

    /// Validate the descriptor's declarative invariants.
    ///
    /// The base reference must carry an explicit version tag; "latest" (or no
    /// tag at all) makes rebuilds non-deterministic and is rejected. The
    /// workdir must stay inside the image root: parent-directory components
    /// are rejected outright.
    pub fn validate(&self) -> StevedoreResult<()> {
        let image = self.base.image.trim();
        let tag = image.rsplit_once(':').map(|(_, t)| t);
        match tag {
            None => {
                return Err(StevedoreError::UnpinnedBase {
                    image: image.to_string(),
                })
            }
            Some(tag) if tag.is_empty() || tag.eq_ignore_ascii_case("latest") => {
                return Err(StevedoreError::UnpinnedBase {
                    image: image.to_string(),
                })
            }
            Some(_) => {}
        }

        if self
            .workdir_rel()
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(StevedoreError::WorkdirEscape {
                workdir: self.workspace.workdir.clone(),
            });
        }
        Ok(())
    }

    /// Resolve the build context directory against the descriptor's parent.
    pub fn context_dir(&self, descriptor_dir: &Path) -> PathBuf {
        if self.workspace.context.is_absolute() {
            self.workspace.context.clone()
        } else {
            descriptor_dir.join(&self.workspace.context)
        }
    }

    /// Resolve the manifest path against the build context.
    pub fn manifest_path(&self, descriptor_dir: &Path) -> PathBuf {
        if self.dependencies.manifest.is_absolute() {
            self.dependencies.manifest.clone()
        } else {
            self.context_dir(descriptor_dir).join(&self.dependencies.manifest)
        }
    }

    /// Working directory inside the image root, stripped of leading `/`.
    ///
    /// Descriptors commonly write `workdir = "/app"`; inside a directory-rooted
    /// image that maps to `<root>/app`.
    pub fn workdir_rel(&self) -> PathBuf {
        let workdir = &self.workspace.workdir;
        workdir
            .strip_prefix("/")
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| workdir.clone())
    }
}

/// Starter descriptor written by `stevedore init`.
pub const INIT_TEMPLATE: &str = r#"# Stevedore build descriptor
#
# Steps run strictly in order: base -> system packages -> workspace copy ->
# dependency install. `stevedore run` then launches the entrypoint and exits
# with its exit code.

[base]
# Version-pinned base runtime reference. "latest" is rejected.
image = "python:3.11-slim"

[system]
# OS packages installed before the workspace exists.
packages = ["ffmpeg"]
manager = "apt-get"

[workspace]
# Everything in the context is copied into the workdir, permissions included.
# Add a .stevedoreignore (gitignore syntax) to exclude files.
context = "."
workdir = "/app"

[dependencies]
# Flat manifest, one specifier per line. Installed with no local cache.
manifest = "requirements.txt"
installer = "pip"

[entrypoint]
interpreter = "python3"
script = "handler.py"
unbuffered = true
"#;

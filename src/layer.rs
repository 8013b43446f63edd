//! Image layers and the build ledger
//!
//! Every build step commits a `Layer`: an immutable record of the step's
//! inputs (as a SHA-256 digest) and a human-readable summary. The full stack
//! is persisted as `stevedore.lock` in the image root, written only after all
//! steps succeed - a failed build leaves no ledger behind.
//!
//! The ledger doubles as the layer cache: a step whose digest matches the
//! previous build's entry can be skipped, mirroring image-layer reuse.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{StevedoreError, StevedoreResult};

/// Ledger file name inside the image root
pub const LEDGER_FILE: &str = "stevedore.lock";

/// Current ledger format version
pub const LEDGER_VERSION: u32 = 1;

/// Kind of build layer, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayerKind {
    Base,
    SystemPackages,
    Workspace,
    Dependencies,
}

impl LayerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerKind::Base => "base",
            LayerKind::SystemPackages => "system-packages",
            LayerKind::Workspace => "workspace",
            LayerKind::Dependencies => "dependencies",
        }
    }
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable record of one executed build step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub kind: LayerKind,
    /// `sha256:<hex>` over the step's canonical inputs
    pub digest: String,
    /// One-line description, e.g. "installed 3 packages via apt-get"
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

impl Layer {
    pub fn new(kind: LayerKind, digest: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            kind,
            digest: digest.into(),
            summary: summary.into(),
            created_at: Utc::now(),
        }
    }
}

/// The committed build ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    pub version: u32,
    pub base_image: String,
    pub layers: Vec<Layer>,
    pub built_at: DateTime<Utc>,
}

impl Ledger {
    pub fn new(base_image: impl Into<String>) -> Self {
        Self {
            version: LEDGER_VERSION,
            base_image: base_image.into(),
            layers: Vec::new(),
            built_at: Utc::now(),
        }
    }

    /// Load a ledger if one exists. Absence is not an error; corruption is.
    pub fn load(path: &Path) -> StevedoreResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        let ledger: Self =
            serde_json::from_str(&content).map_err(|e| StevedoreError::InvalidLedger {
                file: path.to_path_buf(),
                message: e.to_string(),
            })?;
        if ledger.version != LEDGER_VERSION {
            return Err(StevedoreError::InvalidLedger {
                file: path.to_path_buf(),
                message: format!(
                    "unsupported ledger version {} (expected {})",
                    ledger.version, LEDGER_VERSION
                ),
            });
        }
        Ok(Some(ledger))
    }

    /// Write the ledger atomically (temp file + rename).
    pub fn save(&self, path: &Path) -> StevedoreResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("lock.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Look up the committed layer of a given kind
    pub fn layer(&self, kind: LayerKind) -> Option<&Layer> {
        self.layers.iter().find(|l| l.kind == kind)
    }

    pub fn push(&mut self, layer: Layer) {
        self.layers.push(layer);
    }
}

/// Exclusive advisory lock held for the duration of a build.
///
/// Unlocked when dropped. A second build against the same image root fails
/// immediately instead of interleaving steps.
pub struct BuildLock {
    _file: File,
    path: PathBuf,
}

impl BuildLock {
    pub fn acquire(image_root: &Path) -> StevedoreResult<Self> {
        fs::create_dir_all(image_root)?;
        let path = image_root.join(".build.lock");
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        file.try_lock_exclusive()
            .map_err(|_| StevedoreError::LedgerLocked { path: path.clone() })?;
        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Hash a sequence of canonical input parts into a layer digest.
pub fn digest_parts<I, B>(parts: I) -> String
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref());
        hasher.update([0u8]);
    }
    format!("sha256:{:x}", hasher.finalize())
}

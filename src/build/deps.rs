//! Dependency installer step
//!
//! Installs the manifest's specifiers into the interpreter environment with
//! the installer's cache disabled, so the committed image keeps no local
//! download/build cache. The manifest is parsed and validated before the
//! installer runs: unresolvable or conflicting specifiers abort the build
//! up front.

use std::path::Path;

use crate::layer::digest_parts;
use crate::manifest::Manifest;
use crate::runner::Invocation;

/// Installer invocation: `<installer> install --no-cache-dir -r <manifest>`.
///
/// `manifest` is the path of the materialized copy inside the workdir; the
/// invocation runs from there so the installed environment sees the same
/// tree the entrypoint will.
pub fn invocation(installer: &str, manifest: &Path) -> Invocation {
    let manifest_str = manifest.to_string_lossy();
    Invocation::new(
        installer,
        &["install", "--no-cache-dir", "-r", manifest_str.as_ref()],
    )
}

/// Layer digest: installer program plus the raw manifest bytes.
pub fn digest(installer: &str, manifest_content: &[u8]) -> String {
    digest_parts([installer.as_bytes(), manifest_content])
}

/// One-line summary for the committed layer
pub fn summary(manifest: &Manifest, installer: &str) -> String {
    format!(
        "installed {} dependenc{} via {}",
        manifest.len(),
        if manifest.len() == 1 { "y" } else { "ies" },
        installer
    )
}

//! Build context snapshot and materialization
//!
//! Implements the "copy everything" contract: the entire build context is
//! mirrored into the image working directory, permissions included. The only
//! filtering is an explicit opt-in `.stevedoreignore` file (gitignore syntax)
//! plus self-exclusion of the image root, so a context containing its own
//! output never recurses.
//!
//! The walk order is sorted, which makes the context digest deterministic:
//! identical contexts always hash to identical digests.

use std::fs;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use sha2::{Digest, Sha256};

use crate::error::{StevedoreError, StevedoreResult};

/// Ignore file honored inside the build context
pub const IGNORE_FILE: &str = ".stevedoreignore";

/// Kind of context entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    File,
    /// Symlink with its literal target
    Symlink(PathBuf),
}

/// One entry in the context snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextEntry {
    /// Path relative to the context root
    pub rel: PathBuf,
    pub kind: EntryKind,
    /// Unix permission bits (0 on other platforms)
    pub mode: u32,
}

/// A deterministic snapshot of the build context
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    pub root: PathBuf,
    pub entries: Vec<ContextEntry>,
    /// `sha256:<hex>` over paths, modes, and file contents
    pub digest: String,
}

impl ContextSnapshot {
    /// Number of regular files in the snapshot
    pub fn file_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.kind, EntryKind::File))
            .count()
    }
}

fn entry_mode(metadata: &fs::Metadata) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode()
    }
    #[cfg(not(unix))]
    {
        let _ = metadata;
        0
    }
}

/// Walk the build context and compute its snapshot.
///
/// `excludes` are absolute paths pruned from the walk (the image root and
/// lock artifacts). Symlinks pointing outside the context are rejected.
pub fn snapshot(root: &Path, excludes: &[PathBuf]) -> StevedoreResult<ContextSnapshot> {
    if !root.is_dir() {
        return Err(StevedoreError::ContextNotFound {
            path: root.to_path_buf(),
        });
    }
    let canonical_root = root.canonicalize()?;
    let canonical_excludes: Vec<PathBuf> = excludes
        .iter()
        .filter_map(|p| p.canonicalize().ok())
        .collect();

    let mut walker = WalkBuilder::new(&canonical_root);
    walker
        .standard_filters(false)
        .hidden(false)
        .add_custom_ignore_filename(IGNORE_FILE)
        .follow_links(false)
        .sort_by_file_name(|a: &std::ffi::OsStr, b: &std::ffi::OsStr| a.cmp(b));
    {
        let canonical_excludes = canonical_excludes.clone();
        walker.filter_entry(move |entry| {
            !canonical_excludes.iter().any(|ex| entry.path() == ex)
        });
    }

    let mut entries = Vec::new();
    for result in walker.build() {
        let entry = result.map_err(|e| {
            StevedoreError::Io(std::io::Error::other(e.to_string()))
        })?;
        let path = entry.path();
        if path == canonical_root {
            continue;
        }
        let rel = path
            .strip_prefix(&canonical_root)
            .map_err(|_| StevedoreError::ContextEscape {
                path: path.to_path_buf(),
                root: canonical_root.clone(),
            })?
            .to_path_buf();

        let metadata = fs::symlink_metadata(path)?;
        let kind = if metadata.file_type().is_symlink() {
            let target = fs::read_link(path)?;
            let resolved = path
                .parent()
                .map(|p| p.join(&target))
                .unwrap_or_else(|| target.clone());
            // Broken links inside the context are mirrored as-is; anything
            // resolving outside the context boundary is rejected.
            if let Ok(canonical_target) = resolved.canonicalize() {
                if !canonical_target.starts_with(&canonical_root) {
                    return Err(StevedoreError::ContextEscape {
                        path: path.to_path_buf(),
                        root: canonical_root.clone(),
                    });
                }
            }
            EntryKind::Symlink(target)
        } else if metadata.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File
        };

        entries.push(ContextEntry {
            rel,
            kind,
            mode: entry_mode(&metadata),
        });
    }

    let digest = digest_entries(&canonical_root, &entries)?;

    Ok(ContextSnapshot {
        root: canonical_root,
        entries,
        digest,
    })
}

fn digest_entries(root: &Path, entries: &[ContextEntry]) -> StevedoreResult<String> {
    let mut hasher = Sha256::new();
    for entry in entries {
        hasher.update(entry.rel.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(entry.mode.to_le_bytes());
        match &entry.kind {
            EntryKind::Dir => hasher.update(b"d"),
            EntryKind::Symlink(target) => {
                hasher.update(b"l");
                hasher.update(target.to_string_lossy().as_bytes());
            }
            EntryKind::File => {
                hasher.update(b"f");
                let content = fs::read(root.join(&entry.rel))?;
                hasher.update(&content);
            }
        }
        hasher.update([0u8]);
    }
    Ok(format!("sha256:{:x}", hasher.finalize()))
}

/// Mirror the snapshot into `dest`, preserving permissions.
///
/// Returns the number of regular files written.
pub fn materialize(snapshot: &ContextSnapshot, dest: &Path) -> StevedoreResult<usize> {
    fs::create_dir_all(dest)?;
    let mut written = 0;

    for entry in &snapshot.entries {
        let target = dest.join(&entry.rel);
        match &entry.kind {
            EntryKind::Dir => {
                fs::create_dir_all(&target)?;
                set_mode(&target, entry.mode)?;
            }
            EntryKind::File => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                // fs::copy carries permission bits over on unix
                fs::copy(snapshot.root.join(&entry.rel), &target)?;
                written += 1;
            }
            EntryKind::Symlink(link_target) => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                if target.symlink_metadata().is_ok() {
                    fs::remove_file(&target)?;
                }
                #[cfg(unix)]
                std::os::unix::fs::symlink(link_target, &target)?;
                #[cfg(not(unix))]
                {
                    let _ = link_target;
                }
            }
        }
    }

    Ok(written)
}

fn set_mode(path: &Path, mode: u32) -> StevedoreResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
    }

    #[test]
    fn snapshot_includes_everything() {
        let dir = tempdir().unwrap();
        write(dir.path(), "handler.py", "print('hi')\n");
        write(dir.path(), "requirements.txt", "yt-dlp\n");
        write(dir.path(), "lib/util.py", "pass\n");
        write(dir.path(), ".env", "SECRET=1\n");

        let snapshot = snapshot(dir.path(), &[]).unwrap();
        // No implicit filtering: hidden files are copied too.
        assert_eq!(snapshot.file_count(), 4);
    }

    #[test]
    fn snapshot_missing_context_errors() {
        let result = snapshot(Path::new("/nonexistent/context"), &[]);
        assert!(matches!(result, Err(StevedoreError::ContextNotFound { .. })));
    }

    #[test]
    fn snapshot_honors_ignore_file() {
        let dir = tempdir().unwrap();
        write(dir.path(), "handler.py", "print('hi')\n");
        write(dir.path(), "notes.log", "scratch\n");
        write(dir.path(), IGNORE_FILE, "*.log\n");

        let snapshot = snapshot(dir.path(), &[]).unwrap();
        let names: Vec<String> = snapshot
            .entries
            .iter()
            .map(|e| e.rel.to_string_lossy().to_string())
            .collect();
        assert!(names.contains(&"handler.py".to_string()));
        assert!(!names.contains(&"notes.log".to_string()));
    }

    #[test]
    fn snapshot_excludes_image_root() {
        let dir = tempdir().unwrap();
        write(dir.path(), "handler.py", "print('hi')\n");
        write(dir.path(), ".stevedore/image/app/old.py", "stale\n");

        let image_root = dir.path().join(".stevedore");
        let snapshot = snapshot(dir.path(), &[image_root]).unwrap();
        assert_eq!(snapshot.file_count(), 1);
    }

    #[test]
    fn digest_is_deterministic() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.py", "a\n");
        write(dir.path(), "b/c.py", "c\n");

        let first = snapshot(dir.path(), &[]).unwrap();
        let second = snapshot(dir.path(), &[]).unwrap();
        assert_eq!(first.digest, second.digest);
        assert!(first.digest.starts_with("sha256:"));
    }

    #[test]
    fn digest_changes_with_content() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.py", "a\n");
        let before = snapshot(dir.path(), &[]).unwrap();

        write(dir.path(), "a.py", "changed\n");
        let after = snapshot(dir.path(), &[]).unwrap();
        assert_ne!(before.digest, after.digest);
    }

    #[test]
    fn materialize_mirrors_tree() {
        let src = tempdir().unwrap();
        write(src.path(), "handler.py", "print('hi')\n");
        write(src.path(), "lib/util.py", "pass\n");

        let dest = tempdir().unwrap();
        let snap = snapshot(src.path(), &[]).unwrap();
        let written = materialize(&snap, &dest.path().join("app")).unwrap();

        assert_eq!(written, 2);
        let copied = fs::read_to_string(dest.path().join("app/handler.py")).unwrap();
        assert_eq!(copied, "print('hi')\n");
        assert!(dest.path().join("app/lib/util.py").exists());
    }

    #[cfg(unix)]
    #[test]
    fn materialize_preserves_executable_bit() {
        use std::os::unix::fs::PermissionsExt;

        let src = tempdir().unwrap();
        write(src.path(), "run.sh", "#!/bin/sh\n");
        fs::set_permissions(
            src.path().join("run.sh"),
            fs::Permissions::from_mode(0o755),
        )
        .unwrap();

        let dest = tempdir().unwrap();
        let snap = snapshot(src.path(), &[]).unwrap();
        materialize(&snap, dest.path()).unwrap();

        let mode = fs::metadata(dest.path().join("run.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[cfg(unix)]
    #[test]
    fn snapshot_rejects_escaping_symlink() {
        let outside = tempdir().unwrap();
        write(outside.path(), "secret.txt", "s\n");

        let dir = tempdir().unwrap();
        write(dir.path(), "handler.py", "print('hi')\n");
        std::os::unix::fs::symlink(
            outside.path().join("secret.txt"),
            dir.path().join("leak"),
        )
        .unwrap();

        let result = snapshot(dir.path(), &[]);
        assert!(matches!(result, Err(StevedoreError::ContextEscape { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn materialize_recreates_internal_symlink() {
        let src = tempdir().unwrap();
        write(src.path(), "handler.py", "print('hi')\n");
        std::os::unix::fs::symlink("handler.py", src.path().join("main.py")).unwrap();

        let dest = tempdir().unwrap();
        let snap = snapshot(src.path(), &[]).unwrap();
        materialize(&snap, dest.path()).unwrap();

        let link = fs::read_link(dest.path().join("main.py")).unwrap();
        assert_eq!(link, PathBuf::from("handler.py"));
    }
}

//! Context watcher for continuous rebuilds
//!
//! Implements the `watch` command with:
//! - Debouncing (100ms)
//! - Layer-aware rebuilds (system packages run once, dependencies only when
//!   the manifest changes)
//! - Graceful Ctrl+C shutdown
//! - NDJSON output for CI

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::build::{BuildEngine, BuildEvent, BuildOptions};
use crate::descriptor::{Descriptor, DESCRIPTOR_FILE};
use crate::error::StevedoreResult;
use crate::runner::SystemRunner;

/// Debounce duration in milliseconds
const DEBOUNCE_MS: u64 = 100;

/// Watch options
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Directory holding the descriptor (the project root)
    pub project_root: PathBuf,
    /// Image root the build engine targets
    pub image_root: PathBuf,
    /// Output as NDJSON
    pub json: bool,
}

/// Watch event types for NDJSON output
#[derive(Debug, Clone)]
pub enum WatchEvent {
    Started { context: String },
    FileChanged { path: String },
    BuildStarted,
    BuildComplete { executed: usize, cached: usize, skipped: usize },
    Error { message: String },
    Shutdown,
}

impl WatchEvent {
    pub fn to_json(&self) -> String {
        let value = match self {
            WatchEvent::Started { context } => serde_json::json!({
                "event": "started",
                "context": context,
            }),
            WatchEvent::FileChanged { path } => serde_json::json!({
                "event": "file_changed",
                "path": path,
            }),
            WatchEvent::BuildStarted => serde_json::json!({"event": "build_started"}),
            WatchEvent::BuildComplete { executed, cached, skipped } => serde_json::json!({
                "event": "build_complete",
                "executed": executed,
                "cached": cached,
                "skipped": skipped,
            }),
            WatchEvent::Error { message } => serde_json::json!({
                "event": "error",
                "message": message,
            }),
            WatchEvent::Shutdown => serde_json::json!({"event": "shutdown"}),
        };
        value.to_string()
    }
}

/// Watcher state for debouncing
struct WatcherState {
    pending_changes: HashSet<PathBuf>,
    last_change: Option<Instant>,
}

impl WatcherState {
    fn new() -> Self {
        Self {
            pending_changes: HashSet::new(),
            last_change: None,
        }
    }

    fn add_change(&mut self, path: PathBuf) {
        self.pending_changes.insert(path);
        self.last_change = Some(Instant::now());
    }

    fn should_build(&self) -> bool {
        if let Some(last) = self.last_change {
            !self.pending_changes.is_empty()
                && last.elapsed() >= Duration::from_millis(DEBOUNCE_MS)
        } else {
            false
        }
    }

    fn take_changes(&mut self) -> Vec<PathBuf> {
        let changes: Vec<_> = self.pending_changes.drain().collect();
        self.last_change = None;
        changes
    }
}

/// Rebuild options derived from which files actually changed.
///
/// The system-packages layer only depends on the descriptor; the dependency
/// layer only on the manifest. Changes elsewhere re-run just the workspace
/// copy (the other layers hit the digest cache anyway; skipping avoids even
/// reading them).
fn options_for_changes(descriptor: &Descriptor, project_root: &Path, changes: &[PathBuf]) -> BuildOptions {
    // Notifier paths are absolute; normalize both sides before comparing.
    let resolve = |p: &Path| p.canonicalize().unwrap_or_else(|_| p.to_path_buf());
    let descriptor_path = resolve(&project_root.join(DESCRIPTOR_FILE));
    let manifest_path = resolve(&descriptor.manifest_path(project_root));

    let descriptor_changed = changes.iter().any(|p| resolve(p) == descriptor_path);
    let manifest_changed =
        descriptor_changed || changes.iter().any(|p| resolve(p) == manifest_path);

    BuildOptions {
        force: false,
        skip_system: !descriptor_changed,
        skip_dependencies: !manifest_changed,
    }
}

/// Start watching the build context
pub fn watch(
    options: WatchOptions,
    running: Arc<AtomicBool>,
    event_callback: impl Fn(WatchEvent),
) -> StevedoreResult<()> {
    event_callback(WatchEvent::Started {
        context: options.project_root.display().to_string(),
    });

    // Initial build runs everything
    do_build(&options, &BuildOptions::default(), &event_callback)?;

    let (tx, rx) = channel();

    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                for path in event.paths {
                    let _ = tx.send(path);
                }
            }
        },
        Config::default(),
    )
    .map_err(|e| std::io::Error::other(e.to_string()))?;

    watcher
        .watch(&options.project_root, RecursiveMode::Recursive)
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    // Watch loop with debouncing. The image root exists after the initial
    // build, so both self-output filters canonicalize cleanly here.
    let mut state = WatcherState::new();
    let resolve = |p: &Path| p.canonicalize().unwrap_or_else(|_| p.to_path_buf());
    let image_root = resolve(&options.image_root);
    let state_dir = resolve(&options.project_root.join(crate::descriptor::STATE_DIR));

    while running.load(Ordering::SeqCst) {
        if let Ok(path) = rx.recv_timeout(Duration::from_millis(50)) {
            let path = resolve(&path);
            // Our own output must not retrigger the loop
            if !path.starts_with(&image_root) && !path.starts_with(&state_dir) {
                event_callback(WatchEvent::FileChanged {
                    path: path.display().to_string(),
                });
                state.add_change(path);
            }
        }

        if state.should_build() {
            let changes = state.take_changes();
            // A broken intermediate state (bad descriptor or manifest
            // mid-edit) should not kill the watch; report and keep going.
            let descriptor = match Descriptor::load(&options.project_root.join(DESCRIPTOR_FILE)) {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    event_callback(WatchEvent::Error {
                        message: e.to_string(),
                    });
                    continue;
                }
            };
            let build_options = options_for_changes(&descriptor, &options.project_root, &changes);
            if do_build(&options, &build_options, &event_callback).is_err() {
                continue;
            }
        }
    }

    event_callback(WatchEvent::Shutdown);
    Ok(())
}

fn do_build(
    options: &WatchOptions,
    build_options: &BuildOptions,
    callback: &impl Fn(WatchEvent),
) -> StevedoreResult<()> {
    callback(WatchEvent::BuildStarted);

    let descriptor = Descriptor::load(&options.project_root.join(DESCRIPTOR_FILE))?;
    let engine = BuildEngine::new(&descriptor, &options.project_root, options.image_root.clone())
        .with_options(build_options.clone());

    let outcome = match engine.build(&SystemRunner, |_: BuildEvent| {}) {
        Ok(outcome) => outcome,
        Err(e) => {
            callback(WatchEvent::Error {
                message: e.to_string(),
            });
            return Err(e);
        }
    };

    callback(WatchEvent::BuildComplete {
        executed: outcome.executed,
        cached: outcome.cached,
        skipped: outcome.skipped,
    });

    Ok(())
}

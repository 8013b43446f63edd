//! Build engine - executes a plan strictly sequentially, fail-fast
//!
//! Each step commits an immutable layer record; the ledger is written only
//! after every step succeeded. A step whose digest matches the previous
//! build's ledger entry is reused instead of re-executed, unless `--force`.

use std::fs;
use std::path::{Component, Path, PathBuf};

use chrono::Utc;

use crate::build::{deps, packages, plan::Step, BuildEvent, BuildOptions, BuildPlan};
use crate::context;
use crate::descriptor::{Descriptor, STATE_DIR};
use crate::error::{StevedoreError, StevedoreResult};
use crate::layer::{digest_parts, BuildLock, Layer, LayerKind, Ledger, LEDGER_FILE};
use crate::manifest::Manifest;
use crate::runner::CommandRunner;

/// Result of a completed build
#[derive(Debug)]
pub struct BuildOutcome {
    pub ledger: Ledger,
    pub image_root: PathBuf,
    /// Steps actually executed
    pub executed: usize,
    /// Steps reused from the previous ledger (cache hits)
    pub cached: usize,
    /// Steps reused because the caller asked to skip them
    pub skipped: usize,
}

impl BuildOutcome {
    pub fn is_fresh(&self) -> bool {
        self.cached == 0 && self.skipped == 0
    }
}

/// Executes the build pipeline against an image root directory
pub struct BuildEngine<'a> {
    descriptor: &'a Descriptor,
    descriptor_dir: &'a Path,
    image_root: PathBuf,
    options: BuildOptions,
}

impl<'a> BuildEngine<'a> {
    pub fn new(descriptor: &'a Descriptor, descriptor_dir: &'a Path, image_root: PathBuf) -> Self {
        Self {
            descriptor,
            descriptor_dir,
            image_root,
            options: BuildOptions::default(),
        }
    }

    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    /// Destination of the materialized workspace inside the image root
    pub fn workdir_dest(&self) -> PathBuf {
        self.image_root.join(self.descriptor.workdir_rel())
    }

    /// Run the full pipeline. Fail-fast: the first error aborts and no
    /// ledger is written.
    pub fn build<R, F>(&self, runner: &R, mut callback: F) -> StevedoreResult<BuildOutcome>
    where
        R: CommandRunner + ?Sized,
        F: FnMut(BuildEvent),
    {
        self.descriptor.validate()?;

        let plan = BuildPlan::from_descriptor(self.descriptor, self.descriptor_dir);
        let _lock = BuildLock::acquire(&self.image_root)?;

        let ledger_path = self.image_root.join(LEDGER_FILE);
        let previous = Ledger::load(&ledger_path)?;

        callback(BuildEvent::Started { steps: plan.len() });

        let mut ledger = Ledger::new(self.descriptor.base.image.clone());
        let mut executed = 0;
        let mut cached = 0;
        let mut skipped = 0;

        for (index, step) in plan.steps.iter().enumerate() {
            let outcome = self.run_step(index, step, previous.as_ref(), runner, &mut callback)?;
            match outcome {
                StepOutcome::Executed(layer) => {
                    executed += 1;
                    ledger.push(layer);
                }
                StepOutcome::Cached(layer) => {
                    cached += 1;
                    ledger.push(layer);
                }
                StepOutcome::Skipped(Some(layer)) => {
                    skipped += 1;
                    ledger.push(layer);
                }
                StepOutcome::Skipped(None) => {
                    skipped += 1;
                }
            }
        }

        ledger.built_at = Utc::now();
        ledger.save(&ledger_path)?;

        callback(BuildEvent::Completed {
            layers: ledger.layers.len(),
            ledger: ledger_path.display().to_string(),
        });

        Ok(BuildOutcome {
            ledger,
            image_root: self.image_root.clone(),
            executed,
            cached,
            skipped,
        })
    }

    fn run_step<R, F>(
        &self,
        index: usize,
        step: &Step,
        previous: Option<&Ledger>,
        runner: &R,
        callback: &mut F,
    ) -> StevedoreResult<StepOutcome>
    where
        R: CommandRunner + ?Sized,
        F: FnMut(BuildEvent),
    {
        let name = step.name();

        match step {
            Step::Base { image } => {
                let digest = digest_parts(["base", image.as_str()]);
                if let Some(layer) = self.cache_hit(previous, LayerKind::Base, &digest) {
                    callback(BuildEvent::StepCached {
                        index,
                        step: name.to_string(),
                        digest,
                    });
                    return Ok(StepOutcome::Cached(layer));
                }
                callback(BuildEvent::StepStarted { index, step: name.to_string() });
                let summary = format!("base {}", image);
                callback(BuildEvent::StepCompleted {
                    index,
                    step: name.to_string(),
                    digest: digest.clone(),
                    summary: summary.clone(),
                });
                Ok(StepOutcome::Executed(Layer::new(LayerKind::Base, digest, summary)))
            }

            Step::SystemPackages { manager, packages: pkgs } => {
                if self.options.skip_system {
                    return Ok(self.reuse_layer(
                        index,
                        name,
                        LayerKind::SystemPackages,
                        previous,
                        callback,
                    ));
                }
                let digest = packages::digest(manager, pkgs);
                if let Some(layer) = self.cache_hit(previous, LayerKind::SystemPackages, &digest) {
                    callback(BuildEvent::StepCached {
                        index,
                        step: name.to_string(),
                        digest,
                    });
                    return Ok(StepOutcome::Cached(layer));
                }
                callback(BuildEvent::StepStarted { index, step: name.to_string() });
                for invocation in packages::invocations(manager, pkgs) {
                    let status = runner.run(name, &invocation, self.descriptor_dir)?;
                    if status != 0 {
                        return Err(StevedoreError::StepFailed {
                            step: name.to_string(),
                            command: invocation.render(),
                            status,
                        });
                    }
                }
                let summary = packages::summary(manager, pkgs);
                callback(BuildEvent::StepCompleted {
                    index,
                    step: name.to_string(),
                    digest: digest.clone(),
                    summary: summary.clone(),
                });
                Ok(StepOutcome::Executed(Layer::new(
                    LayerKind::SystemPackages,
                    digest,
                    summary,
                )))
            }

            Step::Workspace { context: context_dir, .. } => {
                // The mirror destination must stay inside the image root;
                // the cleanup below deletes whatever is at `dest`.
                if self
                    .descriptor
                    .workdir_rel()
                    .components()
                    .any(|c| matches!(c, Component::ParentDir))
                {
                    return Err(StevedoreError::WorkdirEscape {
                        workdir: self.descriptor.workspace.workdir.clone(),
                    });
                }
                // The state dir and image root are never part of the context,
                // so a context containing its own output cannot recurse.
                let excludes = [self.image_root.clone(), context_dir.join(STATE_DIR)];
                let snapshot = context::snapshot(context_dir, &excludes)?;
                let dest = self.workdir_dest();
                if dest.is_dir() {
                    if let Some(layer) =
                        self.cache_hit(previous, LayerKind::Workspace, &snapshot.digest)
                    {
                        callback(BuildEvent::StepCached {
                            index,
                            step: name.to_string(),
                            digest: snapshot.digest,
                        });
                        return Ok(StepOutcome::Cached(layer));
                    }
                }
                callback(BuildEvent::StepStarted { index, step: name.to_string() });
                // A stale mirror would leave orphans behind; start clean.
                if dest.is_dir() {
                    fs::remove_dir_all(&dest)?;
                }
                let written = context::materialize(&snapshot, &dest)?;
                let summary = format!("copied {} files to {}", written, dest.display());
                callback(BuildEvent::StepCompleted {
                    index,
                    step: name.to_string(),
                    digest: snapshot.digest.clone(),
                    summary: summary.clone(),
                });
                Ok(StepOutcome::Executed(Layer::new(
                    LayerKind::Workspace,
                    snapshot.digest,
                    summary,
                )))
            }

            Step::Dependencies { installer, manifest } => {
                let manifest_src = self.descriptor.manifest_path(self.descriptor_dir);
                // Validation happens before anything runs, cache hit or not:
                // a manifest that no longer parses must fail the build.
                let parsed = Manifest::load(&manifest_src)?;
                let content = fs::read(&manifest_src)?;
                let digest = deps::digest(installer, &content);

                if self.options.skip_dependencies {
                    return Ok(self.reuse_layer(
                        index,
                        name,
                        LayerKind::Dependencies,
                        previous,
                        callback,
                    ));
                }
                if let Some(layer) = self.cache_hit(previous, LayerKind::Dependencies, &digest) {
                    callback(BuildEvent::StepCached {
                        index,
                        step: name.to_string(),
                        digest,
                    });
                    return Ok(StepOutcome::Cached(layer));
                }
                callback(BuildEvent::StepStarted { index, step: name.to_string() });

                // Run from the materialized workdir when the manifest was
                // copied there; fall back to the source tree otherwise.
                let dest = self.workdir_dest();
                let materialized = dest.join(manifest);
                let (cwd, manifest_arg) = if materialized.is_file() {
                    (dest.clone(), manifest.clone())
                } else {
                    (self.descriptor_dir.to_path_buf(), manifest_src.clone())
                };
                let invocation = deps::invocation(installer, &manifest_arg);
                let status = runner.run(name, &invocation, &cwd)?;
                if status != 0 {
                    return Err(StevedoreError::StepFailed {
                        step: name.to_string(),
                        command: invocation.render(),
                        status,
                    });
                }
                let summary = deps::summary(&parsed, installer);
                callback(BuildEvent::StepCompleted {
                    index,
                    step: name.to_string(),
                    digest: digest.clone(),
                    summary: summary.clone(),
                });
                Ok(StepOutcome::Executed(Layer::new(
                    LayerKind::Dependencies,
                    digest,
                    summary,
                )))
            }
        }
    }

    /// Cache hit: same digest committed by the previous build.
    fn cache_hit(&self, previous: Option<&Ledger>, kind: LayerKind, digest: &str) -> Option<Layer> {
        if self.options.force {
            return None;
        }
        previous
            .and_then(|ledger| ledger.layer(kind))
            .filter(|layer| layer.digest == digest)
            .cloned()
    }

    /// Caller-requested skip: reuse the previous layer verbatim when one
    /// exists, otherwise drop the step from this build's ledger.
    fn reuse_layer<F>(
        &self,
        index: usize,
        name: &str,
        kind: LayerKind,
        previous: Option<&Ledger>,
        callback: &mut F,
    ) -> StepOutcome
    where
        F: FnMut(BuildEvent),
    {
        let reused = previous.and_then(|ledger| ledger.layer(kind)).cloned();
        callback(BuildEvent::StepSkipped {
            index,
            step: name.to_string(),
            reason: if reused.is_some() {
                "reusing previous layer".to_string()
            } else {
                "skipped by request".to_string()
            },
        });
        StepOutcome::Skipped(reused)
    }
}

enum StepOutcome {
    Executed(Layer),
    Cached(Layer),
    Skipped(Option<Layer>),
}

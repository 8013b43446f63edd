//! Build pipeline - ordered, fail-fast execution of the image contract
//!
//! Steps run strictly sequentially; each later step assumes the filesystem
//! state the previous one produced. Any failure aborts the whole build and
//! no ledger is committed.

pub mod deps;
pub mod engine;
pub mod packages;
pub mod plan;

pub use engine::{BuildEngine, BuildOutcome};
pub use plan::{BuildPlan, Step};

/// Build options
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Re-run every step even when its digest matches the previous ledger
    pub force: bool,
    /// Reuse the previous system-packages layer without re-running it
    pub skip_system: bool,
    /// Reuse the previous dependencies layer without re-running it
    pub skip_dependencies: bool,
}

/// Build progress events for pretty or NDJSON output
#[derive(Debug, Clone)]
pub enum BuildEvent {
    Started { steps: usize },
    StepStarted { index: usize, step: String },
    /// Digest matched the previous ledger; layer reused
    StepCached { index: usize, step: String, digest: String },
    /// Step reused or bypassed for a reason other than a cache hit
    StepSkipped { index: usize, step: String, reason: String },
    StepCompleted { index: usize, step: String, digest: String, summary: String },
    Completed { layers: usize, ledger: String },
}

impl BuildEvent {
    pub fn to_json(&self) -> String {
        let value = match self {
            BuildEvent::Started { steps } => serde_json::json!({
                "event": "build_started",
                "steps": steps,
            }),
            BuildEvent::StepStarted { index, step } => serde_json::json!({
                "event": "step_started",
                "index": index,
                "step": step,
            }),
            BuildEvent::StepCached { index, step, digest } => serde_json::json!({
                "event": "step_cached",
                "index": index,
                "step": step,
                "digest": digest,
            }),
            BuildEvent::StepSkipped { index, step, reason } => serde_json::json!({
                "event": "step_skipped",
                "index": index,
                "step": step,
                "reason": reason,
            }),
            BuildEvent::StepCompleted { index, step, digest, summary } => serde_json::json!({
                "event": "step_completed",
                "index": index,
                "step": step,
                "digest": digest,
                "summary": summary,
            }),
            BuildEvent::Completed { layers, ledger } => serde_json::json!({
                "event": "build_completed",
                "layers": layers,
                "ledger": ledger,
            }),
        };
        value.to_string()
    }
}

//! Command execution seam
//!
//! Build steps run external programs (the system package manager, the
//! dependency installer). Routing them through a trait keeps the engine
//! testable: tests swap in a recording runner instead of touching the host.

use std::path::Path;
use std::process::Command;

use crate::error::{StevedoreError, StevedoreResult};

/// One external invocation a build step wants to make
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Render as a shell-like string for messages and digests
    pub fn render(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

/// Abstract command runner used by the build engine
pub trait CommandRunner {
    /// Run an invocation to completion; return its exit code.
    fn run(&self, step: &str, invocation: &Invocation, cwd: &Path) -> StevedoreResult<i32>;
}

/// Real runner backed by `std::process::Command`, stdio inherited.
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, step: &str, invocation: &Invocation, cwd: &Path) -> StevedoreResult<i32> {
        let status = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(cwd)
            .status()
            .map_err(|e| StevedoreError::StepSpawn {
                step: step.to_string(),
                command: invocation.render(),
                source: e,
            })?;
        Ok(status.code().unwrap_or(-1))
    }
}

/// Recording runner for tests.
///
/// Uses `Arc<Mutex<>>` internally so it can be cloned and shared.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct RecordingRunner {
    pub calls: std::sync::Arc<std::sync::Mutex<Vec<(String, Invocation)>>>,
    /// Exit code returned for every invocation (0 by default)
    pub exit_code: i32,
    /// Step name whose invocations should fail, if any
    pub fail_step: Option<String>,
}

#[cfg(test)]
impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(step: &str, code: i32) -> Self {
        Self {
            calls: Default::default(),
            exit_code: code,
            fail_step: Some(step.to_string()),
        }
    }

    pub fn recorded(&self) -> Vec<(String, Invocation)> {
        self.calls.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl CommandRunner for RecordingRunner {
    fn run(&self, step: &str, invocation: &Invocation, _cwd: &Path) -> StevedoreResult<i32> {
        self.calls
            .lock()
            .unwrap()
            .push((step.to_string(), invocation.clone()));
        match &self.fail_step {
            Some(failing) if failing == step => Ok(self.exit_code),
            _ => Ok(0),
        }
    }
}

//! Entrypoint launcher - the runtime half of the contract
//!
//! A built image runs exactly one process: `<interpreter> -u <script>`,
//! started from the materialized working directory with inherited stdio.
//! The `-u` flag makes the interpreter's standard streams unbuffered so log
//! lines reach collectors without buffering delay. The launcher defines no
//! restart, supervision, or signal policy; the caller's lifetime is bound
//! 1:1 to the child's, exit code included.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::descriptor::EntrypointConfig;
use crate::error::{StevedoreError, StevedoreResult};

/// Unbuffered-stdio interpreter flag
const UNBUFFERED_FLAG: &str = "-u";

/// A fully resolved entrypoint invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entrypoint {
    pub interpreter: String,
    pub args: Vec<String>,
    pub workdir: PathBuf,
}

impl Entrypoint {
    /// Resolve the entrypoint against a materialized working directory.
    ///
    /// The script must already exist there - launching against a missing
    /// script is reported up front instead of as an interpreter error.
    pub fn resolve(config: &EntrypointConfig, workdir: &Path) -> StevedoreResult<Self> {
        let script_path = workdir.join(&config.script);
        if !script_path.is_file() {
            return Err(StevedoreError::EntrypointMissing { path: script_path });
        }

        let mut args = Vec::new();
        if config.unbuffered {
            args.push(UNBUFFERED_FLAG.to_string());
        }
        args.push(config.script.to_string_lossy().to_string());

        Ok(Self {
            interpreter: config.interpreter.clone(),
            args,
            workdir: workdir.to_path_buf(),
        })
    }

    /// Render as a shell-like string for display
    pub fn render(&self) -> String {
        let mut out = self.interpreter.clone();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }

    /// Run the entrypoint to completion and return its exit code.
    ///
    /// Stdio is inherited. On unix a signal death maps to `128 + signal`,
    /// matching shell convention; there is no other translation layer.
    pub fn run(&self) -> StevedoreResult<i32> {
        let status = Command::new(&self.interpreter)
            .args(&self.args)
            .current_dir(&self.workdir)
            .status()
            .map_err(|e| StevedoreError::LaunchFailed {
                command: self.render(),
                source: e,
            })?;

        if let Some(code) = status.code() {
            return Ok(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Ok(128 + signal);
            }
        }
        Ok(-1)
    }
}

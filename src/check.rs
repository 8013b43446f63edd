//! Descriptor and context validation for `stevedore check`
//!
//! Static checks over the declarative contract: everything that can be
//! verified without running a build. Modeled as a flat report so the CLI can
//! render pretty output or JSON and CI can gate on the error count.

use std::path::Path;

use crate::descriptor::{Descriptor, DESCRIPTOR_FILE};
use crate::error::StevedoreError;
use crate::manifest::Manifest;

/// Status of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warning,
    Error,
}

/// One check result
#[derive(Debug, Clone)]
pub struct Check {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
}

impl Check {
    fn pass(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Pass,
            message: message.into(),
        }
    }

    fn warning(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.into(),
        }
    }

    fn error(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.into(),
        }
    }
}

/// Full check report
#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    pub checks: Vec<Check>,
}

impl CheckReport {
    pub fn passes(&self) -> usize {
        self.count(CheckStatus::Pass)
    }

    pub fn warnings(&self) -> usize {
        self.count(CheckStatus::Warning)
    }

    pub fn errors(&self) -> usize {
        self.count(CheckStatus::Error)
    }

    pub fn is_success(&self) -> bool {
        self.errors() == 0
    }

    fn count(&self, status: CheckStatus) -> usize {
        self.checks.iter().filter(|c| c.status == status).count()
    }

    fn push(&mut self, check: Check) {
        self.checks.push(check);
    }
}

/// Package-manager families with a native install idiom
const KNOWN_MANAGERS: [&str; 6] = ["apt-get", "apt", "apk", "dnf", "yum", "microdnf"];

/// Run all static checks for the project rooted at `project_root`.
pub fn run_checks(project_root: &Path) -> CheckReport {
    let mut report = CheckReport::default();
    let descriptor_path = project_root.join(DESCRIPTOR_FILE);

    let (descriptor, warnings) = match Descriptor::load_with_warnings(&descriptor_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            report.push(Check::error("descriptor", e.to_string()));
            return report;
        }
    };
    report.push(Check::pass(
        "descriptor",
        format!("parsed {}", descriptor_path.display()),
    ));

    for warning in &warnings {
        report.push(Check::warning(
            "descriptor",
            format!("unknown key '{}' ignored", warning.key),
        ));
    }

    match descriptor.validate() {
        Ok(()) => report.push(Check::pass(
            "base",
            format!("pinned to {}", descriptor.base.image),
        )),
        Err(e @ StevedoreError::UnpinnedBase { .. }) => {
            report.push(Check::error("base", e.to_string()))
        }
        Err(e) => report.push(Check::error("workspace", e.to_string())),
    }

    let family = descriptor
        .system
        .manager
        .rsplit('/')
        .next()
        .unwrap_or(&descriptor.system.manager);
    if descriptor.system.packages.is_empty() {
        report.push(Check::pass("system", "no system packages declared"));
    } else if KNOWN_MANAGERS.contains(&family) {
        report.push(Check::pass(
            "system",
            format!(
                "{} package(s) via {}",
                descriptor.system.packages.len(),
                descriptor.system.manager
            ),
        ));
    } else {
        report.push(Check::warning(
            "system",
            format!(
                "unrecognized manager '{}' - using generic install sequence",
                descriptor.system.manager
            ),
        ));
    }

    let context_dir = descriptor.context_dir(project_root);
    if context_dir.is_dir() {
        report.push(Check::pass(
            "workspace",
            format!("context {}", context_dir.display()),
        ));
    } else {
        report.push(Check::error(
            "workspace",
            format!("build context not found: {}", context_dir.display()),
        ));
        return report;
    }

    let manifest_path = descriptor.manifest_path(project_root);
    match Manifest::load(&manifest_path) {
        Ok(manifest) if manifest.is_empty() => {
            report.push(Check::warning("dependencies", "manifest declares nothing"));
        }
        Ok(manifest) => {
            report.push(Check::pass(
                "dependencies",
                format!("{} specifier(s) in {}", manifest.len(), manifest_path.display()),
            ));
        }
        Err(e) => {
            report.push(Check::error("dependencies", e.to_string()));
        }
    }

    let script_path = context_dir.join(&descriptor.entrypoint.script);
    if script_path.is_file() {
        report.push(Check::pass(
            "entrypoint",
            format!(
                "{} {}",
                descriptor.entrypoint.interpreter,
                descriptor.entrypoint.script.display()
            ),
        ));
    } else {
        report.push(Check::error(
            "entrypoint",
            format!(
                "script '{}' not found in context",
                descriptor.entrypoint.script.display()
            ),
        ));
    }

    report
}

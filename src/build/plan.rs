//! Build plan - the ordered step list derived from a descriptor
//!
//! The plan is purely declarative; executing it is the engine's job. Step
//! order is fixed by the contract: base, system packages, workspace copy,
//! dependency install. Later steps assume the filesystem state earlier ones
//! produced.

use std::path::{Path, PathBuf};

use crate::descriptor::Descriptor;

/// One declarative build step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Record the pinned base runtime reference
    Base { image: String },
    /// Install OS packages, then prune the manager's caches
    SystemPackages { manager: String, packages: Vec<String> },
    /// Mirror the build context into the working directory
    Workspace { context: PathBuf, workdir: PathBuf },
    /// Install the manifest into the interpreter environment
    Dependencies { installer: String, manifest: PathBuf },
}

impl Step {
    /// Stable step name used in events, errors, and the ledger
    pub fn name(&self) -> &'static str {
        match self {
            Step::Base { .. } => "base",
            Step::SystemPackages { .. } => "system-packages",
            Step::Workspace { .. } => "workspace",
            Step::Dependencies { .. } => "dependencies",
        }
    }

    /// Human-readable description for `stevedore plan`
    pub fn describe(&self) -> String {
        match self {
            Step::Base { image } => format!("base image {}", image),
            Step::SystemPackages { manager, packages } => {
                format!("install [{}] via {}", packages.join(", "), manager)
            }
            Step::Workspace { context, workdir } => {
                format!("copy {} -> {}", context.display(), workdir.display())
            }
            Step::Dependencies { installer, manifest } => {
                format!("install {} via {}", manifest.display(), installer)
            }
        }
    }
}

/// The full ordered plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    pub steps: Vec<Step>,
}

impl BuildPlan {
    /// Derive the plan from a descriptor.
    ///
    /// An empty package list drops the system-packages step entirely; every
    /// other step is always present.
    pub fn from_descriptor(descriptor: &Descriptor, descriptor_dir: &Path) -> Self {
        let mut steps = vec![Step::Base {
            image: descriptor.base.image.clone(),
        }];

        if !descriptor.system.packages.is_empty() {
            steps.push(Step::SystemPackages {
                manager: descriptor.system.manager.clone(),
                packages: descriptor.system.packages.clone(),
            });
        }

        steps.push(Step::Workspace {
            context: descriptor.context_dir(descriptor_dir),
            workdir: descriptor.workspace.workdir.clone(),
        });

        steps.push(Step::Dependencies {
            installer: descriptor.dependencies.installer.clone(),
            manifest: descriptor.dependencies.manifest.clone(),
        });

        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_orders_steps_per_contract() {
        let mut descriptor = Descriptor::default();
        descriptor.system.packages = vec!["ffmpeg".to_string()];

        let plan = BuildPlan::from_descriptor(&descriptor, Path::new("/project"));
        let names: Vec<&str> = plan.steps.iter().map(Step::name).collect();
        assert_eq!(
            names,
            vec!["base", "system-packages", "workspace", "dependencies"]
        );
    }

    #[test]
    fn plan_drops_empty_package_step() {
        let descriptor = Descriptor::default();
        let plan = BuildPlan::from_descriptor(&descriptor, Path::new("/project"));
        let names: Vec<&str> = plan.steps.iter().map(Step::name).collect();
        assert_eq!(names, vec!["base", "workspace", "dependencies"]);
    }

    #[test]
    fn step_descriptions_are_informative() {
        let step = Step::SystemPackages {
            manager: "apt-get".to_string(),
            packages: vec!["ffmpeg".to_string()],
        };
        assert_eq!(step.describe(), "install [ffmpeg] via apt-get");
    }
}

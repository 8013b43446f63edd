//! System package installer step
//!
//! Translates the declarative package list into the manager's refresh-index,
//! install, and prune-cache invocations. Known manager families get their
//! native idiom; anything else falls back to a generic update/install/clean
//! sequence. The prune keeps the committed image minimal.

use crate::layer::digest_parts;
use crate::runner::Invocation;

/// Ordered invocations for installing `packages` with `manager`.
///
/// Empty package lists produce no invocations; the step is then a no-op.
pub fn invocations(manager: &str, packages: &[String]) -> Vec<Invocation> {
    if packages.is_empty() {
        return Vec::new();
    }
    let pkgs: Vec<&str> = packages.iter().map(String::as_str).collect();

    let family = manager.rsplit('/').next().unwrap_or(manager);
    match family {
        "apt-get" | "apt" => {
            let mut install = vec!["install", "-y", "--no-install-recommends"];
            install.extend(&pkgs);
            vec![
                Invocation::new(manager, &["update"]),
                Invocation::new(manager, &install),
                Invocation::new(manager, &["clean"]),
            ]
        }
        "apk" => {
            // apk's --no-cache fuses refresh + install + prune
            let mut add = vec!["add", "--no-cache"];
            add.extend(&pkgs);
            vec![Invocation::new(manager, &add)]
        }
        "dnf" | "yum" | "microdnf" => {
            let mut install = vec!["install", "-y"];
            install.extend(&pkgs);
            vec![
                Invocation::new(manager, &install),
                Invocation::new(manager, &["clean", "all"]),
            ]
        }
        _ => {
            let mut install = vec!["install", "-y"];
            install.extend(&pkgs);
            vec![
                Invocation::new(manager, &["update"]),
                Invocation::new(manager, &install),
                Invocation::new(manager, &["clean"]),
            ]
        }
    }
}

/// Layer digest for the step: manager plus the sorted package set.
pub fn digest(manager: &str, packages: &[String]) -> String {
    let mut sorted: Vec<&str> = packages.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    let mut parts = vec![manager];
    parts.extend(sorted);
    digest_parts(parts)
}

/// One-line summary for the committed layer
pub fn summary(manager: &str, packages: &[String]) -> String {
    format!(
        "installed {} package{} via {}",
        packages.len(),
        if packages.len() == 1 { "" } else { "s" },
        manager
    )
}

//! Stevedore CLI - declarative container-style build and launch tool
//!
//! Usage: stevedore <COMMAND>
//!
//! Commands:
//!   build   Execute the build pipeline and commit the layer ledger
//!   plan    Print the ordered step plan without executing
//!   check   Validate descriptor, manifest, and context
//!   run     Launch the entrypoint; exit with its exit code
//!   watch   Rebuild on context changes
//!   init    Write a starter descriptor

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};

use stevedore::build::{BuildEvent, BuildOptions};
use stevedore::descriptor::{DESCRIPTOR_FILE, INIT_TEMPLATE};

/// Default image root, relative to the project
const DEFAULT_IMAGE_ROOT: &str = ".stevedore/image";

/// Stevedore - declarative container-style build and launch tool
#[derive(Parser, Debug)]
#[command(name = "stevedore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Output NDJSON events for CI
    #[arg(long, default_value = "false")]
    json: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute the build pipeline and commit the layer ledger
    Build {
        /// Project directory containing stevedore.toml
        #[arg(short, long, default_value = ".")]
        project: PathBuf,

        /// Image root directory (default: <project>/.stevedore/image)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Re-run every step, ignoring the layer cache
        #[arg(short, long)]
        force: bool,
    },

    /// Print the ordered step plan without executing
    Plan {
        /// Project directory containing stevedore.toml
        #[arg(short, long, default_value = ".")]
        project: PathBuf,
    },

    /// Validate descriptor, manifest, and context
    Check {
        /// Project directory containing stevedore.toml
        #[arg(short, long, default_value = ".")]
        project: PathBuf,
    },

    /// Launch the entrypoint process; exit with its exit code
    Run {
        /// Project directory containing stevedore.toml
        #[arg(short, long, default_value = ".")]
        project: PathBuf,

        /// Image root directory (default: <project>/.stevedore/image)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Build (or refresh) the image before launching
        #[arg(long)]
        build: bool,
    },

    /// Watch the context and rebuild on changes
    Watch {
        /// Project directory containing stevedore.toml
        #[arg(short, long, default_value = ".")]
        project: PathBuf,

        /// Image root directory (default: <project>/.stevedore/image)
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Write a starter descriptor into the project directory
    Init {
        /// Project directory
        #[arg(short, long, default_value = ".")]
        project: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let output = Output {
        json: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Build { project, root, force } => cmd_build(&project, root, force, &output),
        Commands::Plan { project } => cmd_plan(&project, &output),
        Commands::Check { project } => cmd_check(&project, &output),
        Commands::Run { project, root, build } => cmd_run(&project, root, build, &output),
        Commands::Watch { project, root } => cmd_watch(&project, root, &output),
        Commands::Init { project } => cmd_init(&project, &output),
    }
}

/// Output settings shared by every subcommand
#[derive(Debug, Clone, Copy)]
struct Output {
    json: bool,
    verbose: u8,
}

/// Expand a leading `~` and resolve the image root for a project.
fn resolve_image_root(project: &Path, root: Option<PathBuf>) -> PathBuf {
    match root {
        Some(root) => {
            let s = root.to_string_lossy().to_string();
            if let Some(rest) = s.strip_prefix("~/") {
                if let Some(home) = dirs::home_dir() {
                    return home.join(rest);
                }
            }
            if root.is_absolute() {
                root
            } else {
                project.join(root)
            }
        }
        None => project.join(DEFAULT_IMAGE_ROOT),
    }
}

fn load_descriptor(project: &Path, output: &Output) -> Result<stevedore::Descriptor> {
    let path = project.join(DESCRIPTOR_FILE);
    let (descriptor, warnings) = stevedore::Descriptor::load_with_warnings(&path)?;
    if !output.json {
        for warning in &warnings {
            println!("⚠ unknown key '{}' in {}", warning.key, warning.file.display());
        }
    }
    Ok(descriptor)
}

fn cmd_build(project: &Path, root: Option<PathBuf>, force: bool, output: &Output) -> Result<()> {
    let image_root = resolve_image_root(project, root);
    let descriptor = load_descriptor(project, output)?;

    if !output.json {
        println!("📦 Stevedore Build");
        println!("Project: {}", project.display());
        println!("Image root: {}", image_root.display());
        if force {
            println!("Mode: Force rebuild");
        }
        println!();
    }

    let engine = stevedore::BuildEngine::new(&descriptor, project, image_root)
        .with_options(BuildOptions { force, ..Default::default() });

    let verbose = output.verbose;
    let outcome = engine.build(&stevedore::SystemRunner, |event| {
        if output.json {
            println!("{}", event.to_json());
        } else {
            match event {
                BuildEvent::Started { steps } => {
                    println!("🔨 {} steps", steps);
                }
                BuildEvent::StepStarted { index, step } => {
                    println!("[{}] {} ...", index + 1, step);
                }
                BuildEvent::StepCached { index, step, digest } => {
                    println!("[{}] {} (cached)", index + 1, step);
                    if verbose > 0 {
                        println!("    {}", digest);
                    }
                }
                BuildEvent::StepSkipped { index, step, reason } => {
                    println!("[{}] {} (skipped: {})", index + 1, step, reason);
                }
                BuildEvent::StepCompleted { index, step, digest, summary } => {
                    println!("[{}] {} ✓ {}", index + 1, step, summary);
                    if verbose > 0 {
                        println!("    {}", digest);
                    }
                }
                BuildEvent::Completed { layers, ledger } => {
                    println!("\n✓ {} layers committed to {}", layers, ledger);
                }
            }
        }
    })?;

    if !output.json {
        println!(
            "Summary: {} executed, {} cached, {} skipped",
            outcome.executed, outcome.cached, outcome.skipped
        );
    }

    Ok(())
}

fn cmd_plan(project: &Path, output: &Output) -> Result<()> {
    let descriptor = load_descriptor(project, output)?;
    descriptor.validate()?;

    let plan = stevedore::BuildPlan::from_descriptor(&descriptor, project);

    if output.json {
        for (index, step) in plan.steps.iter().enumerate() {
            let output = serde_json::json!({
                "event": "step",
                "index": index,
                "step": step.name(),
                "detail": step.describe(),
            });
            println!("{}", serde_json::to_string(&output)?);
        }
    } else {
        println!("📋 Stevedore Plan ({} steps)", plan.len());
        println!();
        for (index, step) in plan.steps.iter().enumerate() {
            println!("  {}. [{}] {}", index + 1, step.name(), step.describe());
        }
        println!();
        println!("Entrypoint: {} {}{}",
            descriptor.entrypoint.interpreter,
            if descriptor.entrypoint.unbuffered { "-u " } else { "" },
            descriptor.entrypoint.script.display()
        );
    }

    Ok(())
}

fn cmd_check(project: &Path, output: &Output) -> Result<()> {
    if !output.json {
        println!("🩺 Stevedore Check");
        println!("Project: {}", project.display());
        println!();
    }

    let report = stevedore::run_checks(project);

    if output.json {
        let output = serde_json::json!({
            "event": "check",
            "passes": report.passes(),
            "warnings": report.warnings(),
            "errors": report.errors(),
            "success": report.is_success()
        });
        println!("{}", serde_json::to_string(&output)?);
    } else {
        for check in &report.checks {
            let icon = match check.status {
                stevedore::CheckStatus::Pass => "✓",
                stevedore::CheckStatus::Warning => "⚠",
                stevedore::CheckStatus::Error => "✗",
            };
            println!("  {} {} - {}", icon, check.name, check.message);
        }
        println!();
        println!(
            "Summary: {} passed, {} warnings, {} errors",
            report.passes(),
            report.warnings(),
            report.errors()
        );
    }

    if !report.is_success() {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_run(project: &Path, root: Option<PathBuf>, build: bool, output: &Output) -> Result<()> {
    let image_root = resolve_image_root(project, root.clone());

    if build {
        cmd_build(project, root, false, output)?;
    }

    let descriptor = load_descriptor(project, output)?;
    let workdir = image_root.join(descriptor.workdir_rel());

    if !workdir.is_dir() {
        anyhow::bail!(
            "image not built at {} - run 'stevedore build' first (or pass --build)",
            image_root.display()
        );
    }

    let entrypoint = stevedore::Entrypoint::resolve(&descriptor.entrypoint, &workdir)?;

    if !output.json {
        println!("🚀 {}", entrypoint.render());
    }

    // The process's lifetime is ours: exit with its code, no translation.
    let code = entrypoint.run()?;
    std::process::exit(code);
}

fn cmd_watch(project: &Path, root: Option<PathBuf>, output: &Output) -> Result<()> {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use stevedore::watcher::{watch, WatchEvent, WatchOptions};

    let image_root = resolve_image_root(project, root);
    let options = WatchOptions {
        project_root: project.to_path_buf(),
        image_root,
        json: output.json,
    };

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();

    ctrlc::set_handler(move || {
        running_clone.store(false, Ordering::SeqCst);
    })?;

    if !output.json {
        println!("👀 Stevedore Watch");
        println!("Project: {}", project.display());
        println!("Press Ctrl+C to stop\n");
    }

    watch(options, running, |event| {
        if output.json {
            println!("{}", event.to_json());
        } else {
            match event {
                WatchEvent::Started { context } => {
                    println!("📂 Watching: {}", context);
                }
                WatchEvent::FileChanged { path } => {
                    println!("📝 Changed: {}", path);
                }
                WatchEvent::BuildStarted => {
                    println!("🔄 Building...");
                }
                WatchEvent::BuildComplete { executed, cached, skipped } => {
                    println!(
                        "✓ Build: {} executed, {} cached, {} skipped",
                        executed, cached, skipped
                    );
                }
                WatchEvent::Error { message } => {
                    eprintln!("✗ Error: {}", message);
                }
                WatchEvent::Shutdown => {
                    println!("\n👋 Shutting down...");
                }
            }
        }
    })?;

    Ok(())
}

fn cmd_init(project: &Path, output: &Output) -> Result<()> {
    let path = project.join(DESCRIPTOR_FILE);
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    std::fs::create_dir_all(project)?;
    std::fs::write(&path, INIT_TEMPLATE)?;

    if output.json {
        let output = serde_json::json!({
            "event": "init",
            "descriptor": path.display().to_string(),
        });
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("✓ Wrote {}", path.display());
        println!("Edit it, then run 'stevedore check'.");
    }

    Ok(())
}

//! Reusable fixture content for integration tests.
//!
//! Descriptors here point `manager` and `installer` at `true` so the build
//! steps invoke a real command that always succeeds, without touching any
//! actual package manager.

/// Descriptor with every step present and harmless commands.
pub const FULL_DESCRIPTOR: &str = r#"[base]
image = "python:3.11-slim"

[system]
packages = ["ffmpeg"]
manager = "true"

[workspace]
context = "."
workdir = "app"

[dependencies]
manifest = "requirements.txt"
installer = "true"

[entrypoint]
interpreter = "sh"
script = "handler.sh"
"#;

/// Descriptor without system packages (skips the system step entirely).
pub const NO_SYSTEM_DESCRIPTOR: &str = r#"[base]
image = "python:3.11-slim"

[dependencies]
installer = "true"

[entrypoint]
interpreter = "sh"
script = "handler.sh"
"#;

/// Descriptor whose system step fails (manager = "false").
pub const FAILING_DESCRIPTOR: &str = r#"[base]
image = "python:3.11-slim"

[system]
packages = ["ffmpeg"]
manager = "false"

[dependencies]
installer = "true"

[entrypoint]
interpreter = "sh"
script = "handler.sh"
"#;

/// A pinned requirements manifest.
pub const REQUIREMENTS: &str = "yt-dlp==2025.1.15\nrequests>=2.31\n";

/// Entrypoint script that exits cleanly.
pub const HANDLER_OK: &str = "#!/bin/sh\nexit 0\n";

/// Entrypoint script that exits with a distinctive code.
pub const HANDLER_EXIT_9: &str = "#!/bin/sh\nexit 9\n";

/// Entrypoint script that prints to stdout before exiting.
pub const HANDLER_ECHO: &str = "#!/bin/sh\necho handler-running\nexit 0\n";

//! Structured logging for debugging conductor.
//!
//! All modules log through `tracing`. This module only installs the
//! subscriber that writes events to `~/.conductor/conductor.log`.
//!
//! Levels:
//! - ERROR: orchestration could not run at all
//! - WARN: recoverable failures (context unavailable, classifier fallback, task failures)
//! - INFO: run lifecycle (selection, batches, aggregate outcome)
//! - DEBUG: per-attempt traces, parsed classifier output
//! - TRACE: raw request/response payloads
//!
//! Debug mode can be enabled with `--debug` flag or `CONDUCTOR_DEBUG=1` env var.
//! `RUST_LOG` takes precedence over both.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Initialize logging at INFO level.
pub fn init() {
    init_with_debug(false);
}

/// Initialize logging with explicit debug mode setting.
pub fn init_with_debug(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(debug || env_debug())));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(false);

    // A second init (tests, embedding) keeps the first subscriber.
    match log_path().and_then(|path| File::create(path).ok()) {
        Some(file) => {
            let _ = builder.with_writer(Mutex::new(file)).try_init();
        }
        None => {
            let _ = builder.with_writer(std::io::stderr).try_init();
        }
    }
}

fn env_debug() -> bool {
    std::env::var("CONDUCTOR_DEBUG")
        .map(|v| is_truthy(&v))
        .unwrap_or(false)
}

fn is_truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn default_directive(debug: bool) -> &'static str {
    if debug {
        "conductor=debug"
    } else {
        "conductor=info"
    }
}

fn log_path() -> Option<PathBuf> {
    let dir = Config::conductor_dir().ok()?;
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir.join("conductor.log"))
}

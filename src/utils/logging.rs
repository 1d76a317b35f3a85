//! Diagnostic logging setup.
//!
//! Nothing is installed globally. [`build_dispatch`] produces a
//! [`tracing::Dispatch`] that the caller scopes with
//! [`tracing::dispatcher::set_default`] and drops on teardown.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing::Dispatch;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the filter directives, e.g. `solace=debug`.
pub const LOG_ENV: &str = "SOLACE_LOG";
pub const DEFAULT_DIRECTIVE: &str = "warn";

pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Build a subscriber writing to stderr, or appending to `log_file` when one
/// is given.
pub fn build_dispatch(log_file: Option<&Path>) -> Result<Dispatch, Box<dyn std::error::Error>> {
    build_dispatch_with_filter(log_file, env_filter())
}

pub fn build_dispatch_with_filter(
    log_file: Option<&Path>,
    filter: EnvFilter,
) -> Result<Dispatch, Box<dyn std::error::Error>> {
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let Some(path) = log_file else {
        return Ok(Dispatch::new(
            builder.with_writer(std::io::stderr).finish(),
        ));
    };

    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Dispatch::new(
        builder
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .finish(),
    ))
}

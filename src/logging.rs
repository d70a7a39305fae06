//! Tracing infrastructure.
//!
//! Structured logging via `tracing` with two outputs: a console layer for
//! the operator, and an optional append-only error-log file receiving
//! WARN-and-above records. The error log only exists once a path has been
//! configured; until then operator-relevant failures go to the console
//! alone.
//!
//! Initialization is idempotent so tests and embedding applications can
//! call it freely.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Initialize tracing for the application.
///
/// `level` is the default console filter (overridable through `RUST_LOG`);
/// `error_log` selects the append-only failure record. Returns an error
/// string when the subscriber cannot be built.
pub fn init(level: &str, error_log: Option<&Path>) -> Result<(), String> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let console_layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_filter(env_filter);

    let error_layer = match error_log {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("Failed to open error log {}: {e}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Arc::new(file))
                    .with_filter(LevelFilter::WARN),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(error_layer)
        .try_init()
        .or_else(|e| {
            // Already-initialized is expected when tests or embedders set
            // up tracing first.
            if e.to_string()
                .contains("a global default trace dispatcher has already been set")
            {
                Ok(())
            } else {
                Err(format!("Failed to initialize tracing: {e}"))
            }
        })
}

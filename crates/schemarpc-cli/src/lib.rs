//! Shared setup for the greeter binaries.

use anyhow::{Context, Result};
use schemarpc_core::{greeter, SchemaSet};
use std::path::Path;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Install the log subscriber.
///
/// `RUST_LOG` wins when set; otherwise `--debug` picks DEBUG over INFO.
/// Logs go to stderr so stdout stays machine-readable.
pub fn init_logging(debug: bool) {
    let log_level = if debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();
}

/// Load the schema from `path`, or the built-in greeter schema.
pub fn load_schema(path: Option<&Path>) -> Result<Arc<SchemaSet>> {
    let schema = match path {
        Some(path) => SchemaSet::load(path)
            .with_context(|| format!("Failed to load schema {}", path.display()))?,
        None => greeter::schema().context("Built-in greeter schema is invalid")?,
    };
    Ok(Arc::new(schema))
}

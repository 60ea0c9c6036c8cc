use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{Error, Result};

/// Installs a global `fmt` subscriber filtered by `filter` (e.g. `info` or
/// `entity_query::sql=debug`).
pub fn init_logging(filter: &str) -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(filter)
                .map_err(|e| Error::InvalidArgument(format!("invalid log filter: {e}")))?,
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|_| Error::InvalidArgument("logging already initialized".into()))
}

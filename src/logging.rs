use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;
use crate::error::{Error, Result};

/// Install the global subscriber. `RUST_LOG` wins over `[logging].level`.
///
/// Events go to stderr so stdout stays clean for command output.
pub fn init(settings: &LoggingSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("decksync={}", settings.level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(settings.thread_ids)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| Error::Config(format!("logging already initialized: {e}")))
}

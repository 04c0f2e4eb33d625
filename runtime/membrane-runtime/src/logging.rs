//!
//! Logging Setup
//!
//! Installs a `tracing-subscriber` fmt subscriber writing to stderr. The
//! filter comes from `MEMBRANE_LOG` when set, else from the configured
//! filter. Only the first call installs anything.
//!

use std::sync::Once;

use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

pub const LOG_ENV: &str = "MEMBRANE_LOG";

static INIT: Once = Once::new();

pub fn init_logging(config: &LogConfig) {
    INIT.call_once(|| {
        let filter = env_filter(config);
        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(config.ansi)
            .with_thread_ids(config.thread_ids)
            .try_init();
        if let Err(err) = installed {
            eprintln!("membrane: logging not installed: {err}");
        }
    });
}

fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("warn"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let config = LogConfig::default();
        init_logging(&config);
        init_logging(&config);
        assert!(INIT.is_completed());
    }
}

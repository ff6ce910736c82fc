//! # Rally Log
//!
//! Logging setup shared by the Rally services and the `rally` CLI.
//!
//! ```no_run
//! use rally_log::Config;
//!
//! rally_log::init_with(Config::from_env()).expect("logger");
//! tracing::info!(port = 8080, "server starting");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod builder;
mod config;
mod error;

use std::sync::OnceLock;

pub use builder::LoggerBuilder;
pub use config::{Config, DisplayConfig, Format};
pub use error::{LogError, LogResult};

static TEST_INIT: OnceLock<()> = OnceLock::new();

/// Pick a configuration from the environment and build profile, then install it
///
/// `RALLY_LOG` or `RUST_LOG` selects [`Config::from_env`]; otherwise debug
/// builds get [`Config::development`] and release builds [`Config::production`].
pub fn auto_init() -> LogResult<()> {
    if std::env::var_os("RALLY_LOG").is_some() || std::env::var_os("RUST_LOG").is_some() {
        init_with(Config::from_env())
    } else if cfg!(debug_assertions) {
        init_with(Config::development())
    } else {
        init_with(Config::production())
    }
}

/// Initialize with default configuration
pub fn init() -> LogResult<()> {
    init_with(Config::default())
}

/// Initialize with custom configuration
pub fn init_with(config: Config) -> LogResult<()> {
    LoggerBuilder::from_config(config).build()
}

/// Initialize for tests
///
/// Safe to call from every test; only the first call installs a subscriber
/// and a subscriber installed elsewhere is left in place.
pub fn init_test() {
    TEST_INIT.get_or_init(|| {
        if tracing::dispatcher::has_been_set() {
            return;
        }
        let _ = LoggerBuilder::from_config(Config::test())
            .with_test_writer()
            .build();
    });
}

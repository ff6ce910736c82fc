//! Layered configuration loading

use std::path::Path;

use anyhow::{Context, bail};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use rally_resilience::ResilienceConfig;

/// Environment prefix; nested keys use `__`, e.g. `RALLY_RATE_LIMITS__USER_DAILY_AMOUNT`
pub const ENV_PREFIX: &str = "RALLY_";

/// Build the provider chain: presets, then the TOML file, then the environment
pub fn figment(path: Option<&Path>) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(ResilienceConfig::default()));
    if let Some(path) = path {
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load and validate the effective configuration
pub fn load(path: Option<&Path>) -> anyhow::Result<ResilienceConfig> {
    if let Some(path) = path {
        if !path.is_file() {
            bail!("config file {} does not exist", path.display());
        }
    }

    let config: ResilienceConfig = figment(path)
        .extract()
        .context("failed to load resilience configuration")?;
    config.validate().context("invalid resilience configuration")?;
    Ok(config)
}

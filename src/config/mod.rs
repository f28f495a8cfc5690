mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    for warning in validate_config(&config)? {
        tracing::warn!("{}", warning);
    }

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = ["./iptvcheck.toml", "~/.config/iptvcheck/config.toml"];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Apply the `--duration` and `--timeout` command-line flags.
///
/// `--timeout` bounds every stream check, so it sets both the probe
/// session limit and the connection check limit.
pub fn apply_check_overrides(config: &mut Config, duration: Option<f64>, timeout: Option<f64>) {
    if let Some(duration) = duration {
        config.probe.duration_secs = duration;
    }
    if let Some(timeout) = timeout {
        config.probe.timeout_secs = timeout;
        config.connection.timeout_secs = timeout;
    }
}

/// Validate configuration, returning non-fatal warnings
pub fn validate_config(config: &Config) -> Result<Vec<String>> {
    config.probe.validate()?;
    config.connection.validate()?;
    config.scoring.validate()?;

    if config.check.jobs == 0 {
        anyhow::bail!("check.jobs must be at least 1");
    }
    if config.catalog.request_timeout_secs == 0 {
        anyhow::bail!("catalog.request_timeout_secs must be at least 1");
    }

    let mut warnings = config.probe.warnings();
    if let Some(server) = &config.catalog.server {
        if config.catalog.username.is_none() || config.catalog.password.is_none() {
            warnings.push(format!(
                "catalog.server is set to {server} but username or password is missing"
            ));
        }
    }
    if config.check.jobs > 16 {
        warnings.push(format!(
            "check.jobs = {}: many providers limit concurrent connections per account",
            config.check.jobs
        ));
    }

    Ok(warnings)
}

use crate::config::types::Config;
use crate::config::validation::validate;
use crate::{ConfigError, ConfigResult};
use std::path::{Path, PathBuf};

/// Environment variables that override configuration values after parsing
pub const ENV_TOUR_URL: &str = "KRPANO_TOUR_URL";
pub const ENV_OUTPUT_DIR: &str = "KRPANO_OUTPUT_DIR";
pub const ENV_MAX_PARALLEL: &str = "KRPANO_MAX_PARALLEL";
pub const ENV_MAX_RETRIES: &str = "KRPANO_MAX_RETRIES";

/// Loads and parses a configuration file from the given path
///
/// Environment overrides are applied before validation, so an override can
/// fix an otherwise invalid file (e.g. a placeholder tour URL).
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use tour_mirror::config::load_config;
///
/// let config = load_config(Path::new("config.toml")).unwrap();
/// println!("Mirroring: {}", config.tour.base_url);
/// ```
pub fn load_config(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path)?;

    let mut config: Config = toml::from_str(&content)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;

    validate(&config)?;

    Ok(config)
}

/// Parses and validates configuration from a TOML string, without
/// environment overrides
pub fn parse_config(content: &str) -> ConfigResult<Config> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Applies environment overrides using the given lookup function
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup(ENV_TOUR_URL) {
        tracing::debug!("{} overrides tour.base-url", ENV_TOUR_URL);
        config.tour.base_url = url;
    }

    if let Some(dir) = lookup(ENV_OUTPUT_DIR) {
        config.download.output_dir = PathBuf::from(dir);
    }

    if let Some(value) = lookup(ENV_MAX_PARALLEL) {
        config.download.max_parallel = value.trim().parse().map_err(|_| {
            ConfigError::Validation(format!("{} must be an integer, got '{}'", ENV_MAX_PARALLEL, value))
        })?;
    }

    if let Some(value) = lookup(ENV_MAX_RETRIES) {
        config.download.max_retries = value.trim().parse().map_err(|_| {
            ConfigError::Validation(format!("{} must be an integer, got '{}'", ENV_MAX_RETRIES, value))
        })?;
    }

    Ok(())
}

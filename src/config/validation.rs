use crate::config::types::{Config, DownloadConfig, RequestConfig, TourConfig};
use crate::{ConfigError, ConfigResult};
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_tour_config(&config.tour)?;
    validate_download_config(&config.download)?;
    validate_request_config(&config.request)?;
    Ok(())
}

/// Validates the tour section
fn validate_tour_config(config: &TourConfig) -> ConfigResult<()> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url '{}': {}", config.base_url, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' must use http or https",
            config.base_url
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' has no host",
            config.base_url
        )));
    }

    if !config.base_url.ends_with('/') {
        return Err(ConfigError::Validation(format!(
            "base-url must end with '/', got '{}'",
            config.base_url
        )));
    }

    if config.xml_file.trim().is_empty() {
        return Err(ConfigError::Validation("xml-file cannot be empty".to_string()));
    }

    if config.base_files.iter().any(|f| f.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "base-files cannot contain empty names".to_string(),
        ));
    }

    Ok(())
}

/// Validates the download section
fn validate_download_config(config: &DownloadConfig) -> ConfigResult<()> {
    if config.max_parallel < 1 || config.max_parallel > 100 {
        return Err(ConfigError::Validation(format!(
            "max-parallel must be between 1 and 100, got {}",
            config.max_parallel
        )));
    }

    if config.output_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation("output-dir cannot be empty".to_string()));
    }

    if config.log_file.trim().is_empty() {
        return Err(ConfigError::Validation("log-file cannot be empty".to_string()));
    }

    Ok(())
}

/// Validates the request section
fn validate_request_config(config: &RequestConfig) -> ConfigResult<()> {
    validate_window("block-wait-ms", config.block_wait_ms)?;
    validate_window("error-wait-ms", config.error_wait_ms)?;

    if config.max_fetch_attempts == Some(0) {
        return Err(ConfigError::Validation(
            "max-fetch-attempts must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_window(name: &str, window: [u64; 2]) -> ConfigResult<()> {
    if window[0] >= window[1] {
        return Err(ConfigError::Validation(format!(
            "{} must be [min, max) with min < max, got [{}, {}]",
            name, window[0], window[1]
        )));
    }
    Ok(())
}

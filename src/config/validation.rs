use crate::config::types::{ApiConfig, Config, CrawlerConfig, OutputConfig};
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_api_config(&config.api)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawl behavior configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent < 1 || config.max_concurrent > 16 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent must be between 1 and 16, got {}",
            config.max_concurrent
        )));
    }

    if config.max_retries < 1 || config.max_retries > 20 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be between 1 and 20, got {}",
            config.max_retries
        )));
    }

    if config.initial_wait_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "initial_wait_secs must be >= 1, got {}",
            config.initial_wait_secs
        )));
    }

    if config.page_delay_ms > 10_000 {
        return Err(ConfigError::Validation(format!(
            "page_delay_ms must be <= 10000ms, got {}ms",
            config.page_delay_ms
        )));
    }

    Ok(())
}

/// Validates the API endpoint configuration
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    if config.base_url.is_empty() {
        return Err(ConfigError::Validation(
            "base_url cannot be empty".to_string(),
        ));
    }

    if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "base_url must start with http:// or https://, got '{}'",
            config.base_url
        )));
    }

    if config.base_url.ends_with('/') {
        return Err(ConfigError::Validation(format!(
            "base_url must not end with a slash, got '{}'",
            config.base_url
        )));
    }

    if config.user_agent.is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.download_dir.is_empty() {
        return Err(ConfigError::Validation(
            "download_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.crawler.max_concurrent = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_excessive_retries() {
        let mut config = Config::default();
        config.crawler.max_retries = 100;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let mut config = Config::default();
        config.api.base_url = "api.bilibili.com".to_string();
        assert!(validate(&config).is_err());

        config.api.base_url = "https://api.bilibili.com/".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_empty_download_dir() {
        let mut config = Config::default();
        config.output.download_dir = String::new();
        assert!(validate(&config).is_err());
    }
}

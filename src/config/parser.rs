use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let config: Config = toml::from_str(&content)?;

    validate(&config)?;

    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// This is recorded into the run metadata so that a later run can be matched
/// to the settings that produced it.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{DetectFailurePolicy, ReplyFetch};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[crawler]
max-concurrent = 5
max-retries = 4
initial-wait-secs = 1
page-delay-ms = 200
comment-page-delay-ms = 100

[api]
base-url = "https://api.example.com"

[output]
download-dir = "./archive"

[collections]
on-detect-failure = "assume-series"

[moments]
include-comments = false
max-comments = 500
reply-fetch = "full"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.max_concurrent, 5);
        assert_eq!(config.crawler.max_retries, 4);
        assert_eq!(config.api.base_url, "https://api.example.com");
        assert_eq!(config.output.download_dir, "./archive");
        assert_eq!(
            config.collections.on_detect_failure,
            DetectFailurePolicy::AssumeSeries
        );
        assert!(!config.moments.include_comments);
        assert_eq!(config.moments.comment_ceiling(), Some(500));
        assert_eq!(config.moments.reply_fetch, ReplyFetch::Full);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config_content = r#"
[crawler]
max-concurrent = 2
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.max_concurrent, 2);
        assert_eq!(config.crawler.max_retries, 5);
        assert_eq!(config.api.base_url, "https://api.bilibili.com");
        assert_eq!(config.moments.comment_ceiling(), None);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let config_content = "this is not valid TOML {{{";
        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = r#"
[crawler]
max-concurrent = 0
"#;

        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_compute_config_hash() {
        let config_content = "test content";
        let file = create_temp_config(config_content);

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        // Same content should produce same hash
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64); // SHA-256 produces 64 hex characters
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}

//! Configuration module for Bili-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files. The config file is optional; every setting has a default and CLI
//! flags override file values.

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ApiConfig, CollectionsConfig, Config, CrawlerConfig, DetectFailurePolicy, MomentsConfig,
    OutputConfig, ReplyFetch,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};

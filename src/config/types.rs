use serde::Deserialize;

/// Main configuration structure for Bili-Harvest
///
/// Every section is optional in the TOML file; missing sections and fields
/// fall back to the defaults below, so running without a config file at all
/// is supported.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub collections: CollectionsConfig,
    #[serde(default)]
    pub moments: MomentsConfig,
}

/// Crawl behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum number of concurrent item operations (downloads, per-moment
    /// comment fetches)
    #[serde(rename = "max-concurrent", default = "default_max_concurrent")]
    pub max_concurrent: u32,

    /// Maximum number of attempts for a rate-limited remote call
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff wait after a rate-limit response (seconds); doubles
    /// on every further rate-limit within the same call
    #[serde(rename = "initial-wait-secs", default = "default_initial_wait_secs")]
    pub initial_wait_secs: u64,

    /// Delay between listing-page requests (milliseconds)
    #[serde(rename = "page-delay-ms", default = "default_page_delay_ms")]
    pub page_delay_ms: u64,

    /// Delay between comment-page requests (milliseconds)
    #[serde(rename = "comment-page-delay-ms", default = "default_comment_page_delay_ms")]
    pub comment_page_delay_ms: u64,
}

/// Remote API endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the platform API
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,

    /// User agent sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Root directory for downloaded artifacts
    #[serde(rename = "download-dir", default = "default_download_dir")]
    pub download_dir: String,
}

/// Collection handling configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionsConfig {
    /// What to do when neither probe identifies the collection scheme
    #[serde(rename = "on-detect-failure", default)]
    pub on_detect_failure: DetectFailurePolicy,
}

/// Policy applied when collection type auto-detection fails both probes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub enum DetectFailurePolicy {
    /// Abort the operation with an explicit error (default)
    #[serde(rename = "error")]
    #[default]
    Error,

    /// Log a warning and proceed as if the collection were a legacy series
    #[serde(rename = "assume-series")]
    AssumeSeries,
}

/// Moment crawling configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MomentsConfig {
    /// Whether to fetch comments for each moment
    #[serde(rename = "include-comments", default = "default_true")]
    pub include_comments: bool,

    /// Per-moment root-comment ceiling; -1 means unlimited
    #[serde(rename = "max-comments", default = "default_max_comments")]
    pub max_comments: i64,

    /// How nested replies are collected
    #[serde(rename = "reply-fetch", default)]
    pub reply_fetch: ReplyFetch,
}

/// Nested-reply collection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub enum ReplyFetch {
    /// Keep whatever replies the root listing embeds inline (default)
    #[serde(rename = "inline")]
    #[default]
    Inline,

    /// Paginate every reply thread exhaustively
    #[serde(rename = "full")]
    Full,
}

fn default_max_concurrent() -> u32 {
    3
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_wait_secs() -> u64 {
    3
}

fn default_page_delay_ms() -> u64 {
    500
}

fn default_comment_page_delay_ms() -> u64 {
    300
}

fn default_base_url() -> String {
    "https://api.bilibili.com".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36"
        .to_string()
}

fn default_download_dir() -> String {
    "downloads".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_comments() -> i64 {
    -1
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_retries: default_max_retries(),
            initial_wait_secs: default_initial_wait_secs(),
            page_delay_ms: default_page_delay_ms(),
            comment_page_delay_ms: default_comment_page_delay_ms(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
        }
    }
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            on_detect_failure: DetectFailurePolicy::default(),
        }
    }
}

impl Default for MomentsConfig {
    fn default() -> Self {
        Self {
            include_comments: default_true(),
            max_comments: default_max_comments(),
            reply_fetch: ReplyFetch::default(),
        }
    }
}

impl MomentsConfig {
    /// Converts the -1-means-unlimited ceiling into an Option.
    pub fn comment_ceiling(&self) -> Option<u64> {
        if self.max_comments < 0 {
            None
        } else {
            Some(self.max_comments as u64)
        }
    }
}

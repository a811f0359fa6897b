//! Bili-Harvest main entry point
//!
//! This is the command-line interface for the Bili-Harvest archiver.

use std::path::PathBuf;
use std::sync::Arc;

use bili_harvest::api::types::CollectionKind;
use bili_harvest::config::{load_config_with_hash, Config, ReplyFetch};
use bili_harvest::crawler::MomentOptions;
use bili_harvest::credential::{self, CredentialStore};
use anyhow::Context;
use bili_harvest::{BiliClient, Coordinator};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Bili-Harvest: a personal bilibili archiver
///
/// Bili-Harvest enumerates a user's videos, collections, and moments, then
/// downloads media and persists moments/comments as JSON. Reruns skip
/// everything already on disk.
#[derive(Parser, Debug)]
#[command(name = "bili-harvest")]
#[command(version)]
#[command(about = "A personal bilibili archiver", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(long, short = 'c', global = true, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Path to JSON credential file (SESSDATA, bili_jct, ...)
    #[arg(long, global = true, value_name = "FILE")]
    credentials: Option<PathBuf>,

    /// Preferred quality label (informational; a credential unlocks tiers)
    #[arg(long, global = true, default_value = "auto")]
    quality: String,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every video a user has uploaded
    ListVideos {
        /// User id
        uid: u64,
    },

    /// Download a single video
    DownloadVideo {
        /// Video id (BV...)
        bvid: String,
        /// Download directory
        #[arg(long, short = 'd')]
        dir: Option<PathBuf>,
        /// Skip the dialogue-overlay sidecars
        #[arg(long)]
        no_danmaku: bool,
    },

    /// Download every video a user has uploaded
    DownloadUser {
        /// User id
        uid: u64,
        /// Download directory
        #[arg(long, short = 'd')]
        dir: Option<PathBuf>,
        /// Maximum concurrent downloads
        #[arg(long, short = 'n')]
        concurrent: Option<u32>,
        /// Skip the dialogue-overlay sidecars
        #[arg(long)]
        no_danmaku: bool,
    },

    /// List a user's collections (both schemes)
    ListSeries {
        /// User id
        uid: u64,
    },

    /// List the videos inside a collection
    ListSeriesVideos {
        /// Collection id
        series_id: u64,
        /// Collection scheme
        #[arg(long, short = 't', value_enum, default_value_t = KindArg::Auto)]
        r#type: KindArg,
    },

    /// Download every video of a collection
    DownloadSeries {
        /// Collection id
        series_id: u64,
        /// Collection scheme
        #[arg(long, short = 't', value_enum, default_value_t = KindArg::Auto)]
        r#type: KindArg,
        /// Download directory
        #[arg(long, short = 'd')]
        dir: Option<PathBuf>,
        /// Maximum concurrent downloads
        #[arg(long, short = 'n')]
        concurrent: Option<u32>,
        /// Skip the dialogue-overlay sidecars
        #[arg(long)]
        no_danmaku: bool,
    },

    /// List a user's recent moments
    ListMoments {
        /// User id
        uid: u64,
        /// Maximum number of moments to show
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },

    /// Crawl a user's moments and their comments
    DownloadMoments {
        /// User id
        uid: u64,
        /// Download directory
        #[arg(long, short = 'd')]
        dir: Option<PathBuf>,
        /// Maximum concurrent moment fetches
        #[arg(long, short = 'n')]
        concurrent: Option<u32>,
        /// Save moments without their comments
        #[arg(long)]
        no_comments: bool,
        /// Per-moment root-comment ceiling (-1 = unlimited)
        #[arg(long)]
        max_comments: Option<i64>,
        /// Paginate every reply thread instead of keeping inline replies
        #[arg(long)]
        full_replies: bool,
    },

    /// Download a single moment
    DownloadMoment {
        /// Moment id
        moment_id: String,
        /// Download directory
        #[arg(long, short = 'd')]
        dir: Option<PathBuf>,
        /// Save the moment without its comments
        #[arg(long)]
        no_comments: bool,
        /// Paginate every reply thread instead of keeping inline replies
        #[arg(long)]
        full_replies: bool,
    },
}

/// Collection scheme selector for the CLI
#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    /// Probe the scheme automatically
    Auto,
    /// Legacy series scheme
    Series,
    /// Newer season scheme
    Season,
}

impl KindArg {
    fn resolve(self) -> Option<CollectionKind> {
        match self {
            Self::Auto => None,
            Self::Series => Some(CollectionKind::Series),
            Self::Season => Some(CollectionKind::Season),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    let (mut config, config_hash) = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (config, Some(hash))
        }
        None => (Config::default(), None),
    };
    apply_overrides(&mut config, &cli.command);
    let moments_config = config.moments.clone();

    // Load credentials: env vars as defaults, file values override
    let credential = credential::load(cli.credentials.as_deref());
    if credential.is_some() {
        tracing::info!("Credential loaded; higher quality tiers are available");
    } else {
        tracing::info!("No credential; running anonymously at lower quality tiers");
    }
    let store = Arc::new(CredentialStore::new(credential));

    let client = BiliClient::new(&config.api, store)?;
    let download_danmaku = danmaku_enabled(&cli.command);
    let coordinator = Coordinator::new(config, client)
        .with_config_hash(config_hash)
        .with_quality(cli.quality.clone())
        .with_danmaku(download_danmaku);
    coordinator.install_interrupt_handler();

    match cli.command {
        Command::ListVideos { uid } => coordinator.list_videos(uid).await?,
        Command::DownloadVideo { bvid, .. } => coordinator.download_video(&bvid).await?,
        Command::DownloadUser { uid, .. } => coordinator.download_user(uid).await?,
        Command::ListSeries { uid } => coordinator.list_collections(uid).await?,
        Command::ListSeriesVideos { series_id, r#type } => {
            coordinator
                .list_collection_videos(series_id, r#type.resolve())
                .await?
        }
        Command::DownloadSeries {
            series_id, r#type, ..
        } => {
            coordinator
                .download_collection(series_id, r#type.resolve())
                .await?
        }
        Command::ListMoments { uid, limit } => coordinator.list_moments(uid, limit).await?,
        Command::DownloadMoments {
            uid,
            no_comments,
            max_comments,
            full_replies,
            ..
        } => {
            let options = moment_options(
                &moments_config,
                no_comments,
                max_comments,
                full_replies,
            );
            coordinator.download_moments(uid, options).await?
        }
        Command::DownloadMoment {
            moment_id,
            no_comments,
            full_replies,
            ..
        } => {
            let options = moment_options(&moments_config, no_comments, None, full_replies);
            coordinator.download_moment(&moment_id, options).await?
        }
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("bili_harvest=info,warn"),
            1 => EnvFilter::new("bili_harvest=debug,info"),
            2 => EnvFilter::new("bili_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Folds per-command flags into the loaded configuration
fn apply_overrides(config: &mut Config, command: &Command) {
    let (dir, concurrent) = match command {
        Command::DownloadVideo { dir, .. } | Command::DownloadMoment { dir, .. } => {
            (dir.as_ref(), None)
        }
        Command::DownloadUser {
            dir, concurrent, ..
        }
        | Command::DownloadSeries {
            dir, concurrent, ..
        }
        | Command::DownloadMoments {
            dir, concurrent, ..
        } => (dir.as_ref(), *concurrent),
        _ => (None, None),
    };

    if let Some(dir) = dir {
        config.output.download_dir = dir.display().to_string();
    }
    if let Some(concurrent) = concurrent {
        config.crawler.max_concurrent = concurrent.max(1);
    }
}

fn danmaku_enabled(command: &Command) -> bool {
    !matches!(
        command,
        Command::DownloadVideo {
            no_danmaku: true, ..
        } | Command::DownloadUser {
            no_danmaku: true, ..
        } | Command::DownloadSeries {
            no_danmaku: true, ..
        }
    )
}

fn moment_options(
    config: &bili_harvest::config::MomentsConfig,
    no_comments: bool,
    max_comments: Option<i64>,
    full_replies: bool,
) -> MomentOptions {
    let mut options = MomentOptions::from_config(config);
    if no_comments {
        options.include_comments = false;
    }
    if let Some(ceiling) = max_comments {
        options.comment_ceiling = if ceiling < 0 {
            None
        } else {
            Some(ceiling as u64)
        };
    }
    if full_replies {
        options.reply_fetch = ReplyFetch::Full;
    }
    options
}

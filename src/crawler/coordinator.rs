//! Crawl coordinator - one flow per CLI command
//!
//! The coordinator ties the engine together:
//! - Resolving the user/collection identity before any listing starts
//! - Driving the pagers to produce work lists (or, for moments,
//!   interleaving listing pages with dispatch)
//! - Dispatching work items through the concurrency gate
//! - Aggregating statistics and persisting run metadata
//! - Honoring an interrupt by not dispatching further work while letting
//!   in-flight operations finish

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::api::types::{CollectionKind, CollectionMeta, Moment, UserInfo, VideoSummary};
use crate::api::{with_retry, BiliClient, RetryPolicy};
use crate::config::Config;
use crate::crawler::collections::CollectionResolver;
use crate::crawler::gate::{dispatch_all, ConcurrencyGate, ItemOutcome};
use crate::crawler::moments::{MomentCommentFetcher, MomentOptions};
use crate::crawler::pager::{CursorBatch, CursorPager, NumberedPager, PagerSettings};
use crate::crawler::videos::{DownloadStatus, FailureReason, VideoFetcher};
use crate::media::Muxer;
use crate::output::naming::{collection_folder_name, user_folder_name};
use crate::output::{write_run_metadata, CrawlStats};
use crate::Result;

/// User video listings are requested at this fixed size.
const USER_VIDEO_PAGE_SIZE: usize = 30;

/// Moment preview listings stop after this many feed pages.
const MOMENT_PREVIEW_PAGE_CAP: u32 = 10;

/// Top-level crawl coordinator.
pub struct Coordinator {
    config: Config,
    client: BiliClient,
    gate: ConcurrencyGate,
    muxer: Muxer,
    stop: Arc<AtomicBool>,
    config_hash: Option<String>,
    preferred_quality: String,
    download_danmaku: bool,
}

impl Coordinator {
    pub fn new(config: Config, client: BiliClient) -> Self {
        let gate = ConcurrencyGate::new(config.crawler.max_concurrent as usize);
        Self {
            config,
            client,
            gate,
            muxer: Muxer::new(),
            stop: Arc::new(AtomicBool::new(false)),
            config_hash: None,
            preferred_quality: "auto".to_string(),
            download_danmaku: true,
        }
    }

    pub fn with_muxer(mut self, muxer: Muxer) -> Self {
        self.muxer = muxer;
        self
    }

    pub fn with_config_hash(mut self, hash: Option<String>) -> Self {
        self.config_hash = hash;
        self
    }

    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.preferred_quality = quality.into();
        self
    }

    pub fn with_danmaku(mut self, download_danmaku: bool) -> Self {
        self.download_danmaku = download_danmaku;
        self
    }

    /// Installs a ctrl-c watcher that flips the stop flag.
    ///
    /// New work stops being dispatched once the flag is set; operations
    /// already holding a permit finish or fail naturally.
    pub fn install_interrupt_handler(&self) {
        let stop = self.stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received: finishing in-flight work, dispatching nothing new");
                stop.store(true, Ordering::SeqCst);
            }
        });
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.config.crawler.max_retries,
            Duration::from_secs(self.config.crawler.initial_wait_secs),
        )
    }

    fn page_settings(&self) -> PagerSettings {
        PagerSettings::with_delay(Duration::from_millis(self.config.crawler.page_delay_ms))
    }

    fn comment_delay(&self) -> Duration {
        Duration::from_millis(self.config.crawler.comment_page_delay_ms)
    }

    fn download_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.output.download_dir)
    }

    async fn fetch_user(&self, uid: u64) -> Option<UserInfo> {
        let policy = self.retry_policy();
        with_retry(&policy, &self.client, "user info", || {
            self.client.get_user_info(uid)
        })
        .await
    }

    async fn warn_if_muxer_missing(&self) {
        if !self.muxer.is_available().await {
            warn!("muxer binary not found on PATH");
            println!("Warning: ffmpeg was not found; downloads that need muxing will fail.");
            println!("Install it from https://ffmpeg.org/");
        }
    }

    // ===== Video flows =====

    /// Lists every video a user has uploaded, newest first.
    pub async fn list_videos(&self, uid: u64) -> Result<()> {
        let Some(user) = self.fetch_user(uid).await else {
            println!("Could not fetch user {}; check the id", uid);
            return Ok(());
        };
        println!("\nUser: {} (UID {})", user.name, uid);

        let mut videos = self.collect_user_videos(uid).await;
        if videos.is_empty() {
            println!("No videos found");
            return Ok(());
        }

        videos.sort_by_key(|v| std::cmp::Reverse(v.created));
        println!("{} videos\n", videos.len());
        for (index, video) in videos.iter().enumerate() {
            println!(
                "{:3}. {} [{}] ({}, {} plays)",
                index + 1,
                video.title,
                video.bvid,
                format_date(video.created),
                video.play_count()
            );
        }
        Ok(())
    }

    async fn collect_user_videos(&self, uid: u64) -> Vec<VideoSummary> {
        let policy = self.retry_policy();
        let client = &self.client;
        info!(uid, "listing user videos");

        let fetch = |page: u32| {
            let policy = &policy;
            async move {
                with_retry(policy, client, "user videos page", || {
                    client.get_user_videos_page(uid, page, USER_VIDEO_PAGE_SIZE)
                })
                .await
            }
        };
        NumberedPager::new(USER_VIDEO_PAGE_SIZE, self.page_settings(), fetch)
            .collect()
            .await
    }

    /// Downloads a single video into the standalone folder.
    pub async fn download_video(&self, bvid: &str) -> Result<()> {
        self.warn_if_muxer_missing().await;

        let folder = self.download_dir().join("single_videos");
        tokio::fs::create_dir_all(&folder).await?;

        let policy = self.retry_policy();
        let fetcher = VideoFetcher::new(
            &self.client,
            policy,
            &self.muxer,
            self.download_danmaku,
            self.preferred_quality.as_str(),
        );

        match fetcher.download(bvid, &folder).await {
            DownloadStatus::Done => println!("Download complete: {}", bvid),
            DownloadStatus::AlreadyPresent => println!("Already downloaded: {}", bvid),
            DownloadStatus::PartialFailure => {
                println!("Some sub-parts failed for {}", bvid);
            }
            DownloadStatus::Failed(reason) => {
                println!("Download failed for {}: {}", bvid, describe_failure(reason));
            }
        }
        Ok(())
    }

    /// Downloads every video a user has uploaded.
    pub async fn download_user(&self, uid: u64) -> Result<()> {
        let Some(user) = self.fetch_user(uid).await else {
            println!("Could not fetch user {}; check the id", uid);
            return Ok(());
        };
        println!("\nDownloading videos of {} (UID {})", user.name, uid);

        let folder = self.download_dir().join(user_folder_name(&user.name, uid));
        tokio::fs::create_dir_all(&folder).await?;
        info!(folder = %folder.display(), "download folder ready");

        self.warn_if_muxer_missing().await;

        let videos = self.collect_user_videos(uid).await;
        let mut stats = CrawlStats::new();
        stats.items_seen = videos.len() as u64;
        if videos.is_empty() {
            println!("No videos found");
            return Ok(());
        }
        println!("Found {} videos, downloading...", videos.len());

        let policy = self.retry_policy();
        let fetcher = VideoFetcher::new(
            &self.client,
            policy,
            &self.muxer,
            self.download_danmaku,
            self.preferred_quality.as_str(),
        );

        let outcome = dispatch_all(&self.gate, videos, |video| {
            let fetcher = &fetcher;
            let folder = &folder;
            async move {
                if self.stopped() {
                    return ItemOutcome::Skipped;
                }
                fetcher.download(&video.bvid, folder).await.as_outcome()
            }
        })
        .await;
        stats.absorb(&outcome);

        if let Err(e) = write_run_metadata(
            &folder.join("metadata.json"),
            Some(&user),
            &stats,
            self.config_hash.as_deref(),
        )
        .await
        {
            warn!(error = %e, "failed to write run metadata");
        }
        stats.print_summary("Download");
        Ok(())
    }

    // ===== Collection flows =====

    /// Lists a user's collections across both schemes, newest first.
    pub async fn list_collections(&self, uid: u64) -> Result<()> {
        let Some(user) = self.fetch_user(uid).await else {
            println!("Could not fetch user {}; check the id", uid);
            return Ok(());
        };
        println!("\nUser: {} (UID {})", user.name, uid);

        let policy = self.retry_policy();
        let Some(listing) = with_retry(&policy, &self.client, "space collections", || {
            self.client.get_space_collections(uid, 1, 100)
        })
        .await
        else {
            println!("No collections found");
            return Ok(());
        };

        let mut collections: Vec<(CollectionKind, CollectionMeta)> = Vec::new();
        for item in listing.items_lists.seasons_list {
            collections.push((CollectionKind::Season, item.meta));
        }
        for item in listing.items_lists.series_list {
            collections.push((CollectionKind::Series, item.meta));
        }
        if collections.is_empty() {
            println!("No collections found");
            return Ok(());
        }

        collections.sort_by_key(|(_, meta)| std::cmp::Reverse(meta.created));
        println!("{} collections\n", collections.len());
        for (index, (kind, meta)) in collections.iter().enumerate() {
            println!(
                "{:3}. {} [ID: {}, {}]",
                index + 1,
                meta.name,
                meta.id,
                kind.as_str().to_uppercase()
            );
            println!(
                "     {} videos | created {}",
                meta.total,
                format_date(meta.created)
            );
            if !meta.description.is_empty() {
                let description: String = meta.description.chars().take(80).collect();
                println!("     {}", description);
            }
            println!();
        }
        Ok(())
    }

    /// Lists the members of one collection.
    pub async fn list_collection_videos(
        &self,
        collection_id: u64,
        requested: Option<CollectionKind>,
    ) -> Result<()> {
        let resolver = CollectionResolver::new(
            &self.client,
            self.retry_policy(),
            self.config.collections.on_detect_failure,
        );
        let kind = resolver.resolve_kind(collection_id, requested).await?;

        let mut videos = resolver
            .list_members(kind, collection_id, self.page_settings())
            .await;
        if videos.is_empty() {
            println!("No videos found in collection {}", collection_id);
            return Ok(());
        }

        videos.sort_by_key(|v| std::cmp::Reverse(v.published));
        println!(
            "\nCollection {} ({})\n{} videos\n",
            collection_id,
            kind.as_str().to_uppercase(),
            videos.len()
        );
        for (index, video) in videos.iter().enumerate() {
            println!("{:3}. {} [{}]", index + 1, video.title, video.bvid);
            println!(
                "     {} | {} plays",
                format_duration(video.duration),
                video.views
            );
            println!();
        }
        Ok(())
    }

    /// Downloads every member of one collection.
    pub async fn download_collection(
        &self,
        collection_id: u64,
        requested: Option<CollectionKind>,
    ) -> Result<()> {
        let resolver = CollectionResolver::new(
            &self.client,
            self.retry_policy(),
            self.config.collections.on_detect_failure,
        );
        let kind = resolver.resolve_kind(collection_id, requested).await?;

        let name = resolver
            .meta(kind, collection_id)
            .await
            .map(|meta| meta.name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("Collection_{}", collection_id));

        let folder = self
            .download_dir()
            .join(collection_folder_name(&name, collection_id));
        tokio::fs::create_dir_all(&folder).await?;
        info!(
            collection_id,
            kind = %kind,
            folder = %folder.display(),
            "downloading collection"
        );
        println!("\nDownloading collection: {} ({})", name, kind.as_str().to_uppercase());

        self.warn_if_muxer_missing().await;

        let members: Vec<_> = resolver
            .list_members(kind, collection_id, self.page_settings())
            .await
            .into_iter()
            .filter(|video| !video.bvid.is_empty())
            .collect();

        let mut stats = CrawlStats::new();
        stats.items_seen = members.len() as u64;
        if members.is_empty() {
            println!("No videos found");
            return Ok(());
        }
        println!("Found {} videos, downloading...", members.len());

        let policy = self.retry_policy();
        let fetcher = VideoFetcher::new(
            &self.client,
            policy,
            &self.muxer,
            self.download_danmaku,
            self.preferred_quality.as_str(),
        );

        let outcome = dispatch_all(&self.gate, members, |video| {
            let fetcher = &fetcher;
            let folder = &folder;
            async move {
                if self.stopped() {
                    return ItemOutcome::Skipped;
                }
                fetcher.download(&video.bvid, folder).await.as_outcome()
            }
        })
        .await;
        stats.absorb(&outcome);

        if let Err(e) = write_run_metadata(
            &folder.join("metadata.json"),
            None,
            &stats,
            self.config_hash.as_deref(),
        )
        .await
        {
            warn!(error = %e, "failed to write run metadata");
        }
        stats.print_summary("Collection download");
        Ok(())
    }

    // ===== Moment flows =====

    /// Prints a bounded preview of a user's recent moments.
    pub async fn list_moments(&self, uid: u64, limit: usize) -> Result<()> {
        let Some(user) = self.fetch_user(uid).await else {
            println!("Could not fetch user {}; check the id", uid);
            return Ok(());
        };
        println!("\nUser: {} (UID {})", user.name, uid);
        println!("Fetching up to {} recent moments...", limit);

        let policy = self.retry_policy();
        let client = &self.client;
        let fetch = |offset: String| {
            let policy = &policy;
            async move {
                with_retry(policy, client, "moment feed", || {
                    client.get_moments_page(uid, &offset)
                })
                .await
                .map(|feed| CursorBatch {
                    items: feed.items.into_iter().map(Moment::new).collect(),
                    next: if feed.has_more { feed.offset } else { None },
                })
            }
        };
        let settings = PagerSettings {
            max_pages: Some(MOMENT_PREVIEW_PAGE_CAP),
            ..self.page_settings()
        };
        let mut pager = CursorPager::new(settings, fetch);

        let mut moments: Vec<Moment> = Vec::new();
        while moments.len() < limit {
            match pager.next_batch().await {
                Some(batch) => moments.extend(batch),
                None => break,
            }
        }
        moments.truncate(limit);

        if moments.is_empty() {
            println!("No moments found");
            return Ok(());
        }
        println!("{} moments\n", moments.len());
        for (index, moment) in moments.iter().enumerate() {
            println!(
                "{:3}. [{}] {}",
                index + 1,
                moment.type_tag(),
                moment.id().unwrap_or("?")
            );
            println!("     {}", format_datetime(moment.pub_ts()));
            if let Some(text) = moment.summary_text() {
                let text: String = text.chars().take(100).collect();
                println!("     {}", text);
            }
            println!();
        }
        Ok(())
    }

    /// Crawls every moment of a user, dispatching each listing page as soon
    /// as it arrives.
    ///
    /// The interleaving bounds peak memory and lets partial progress
    /// survive a mid-run interrupt: artifacts written so far make the next
    /// run skip straight past them.
    pub async fn download_moments(&self, uid: u64, options: MomentOptions) -> Result<()> {
        let Some(user) = self.fetch_user(uid).await else {
            println!("Could not fetch user {}; check the id", uid);
            return Ok(());
        };
        println!(
            "\nCrawling moments of {} (UID {}){}",
            user.name,
            uid,
            if options.include_comments {
                " with comments"
            } else {
                ""
            }
        );

        let save_root = self.download_dir().join(user_folder_name(&user.name, uid));
        let save_dir = save_root.join("dynamics");
        tokio::fs::create_dir_all(&save_dir).await?;

        let fetcher = MomentCommentFetcher::new(
            &self.client,
            self.retry_policy(),
            options,
            self.comment_delay(),
        );

        let policy = self.retry_policy();
        let client = &self.client;
        let fetch = |offset: String| {
            let policy = &policy;
            async move {
                with_retry(policy, client, "moment feed", || {
                    client.get_moments_page(uid, &offset)
                })
                .await
                .map(|feed| CursorBatch {
                    items: feed.items.into_iter().map(Moment::new).collect(),
                    next: if feed.has_more { feed.offset } else { None },
                })
            }
        };
        let mut pager = CursorPager::new(self.page_settings(), fetch);

        let mut stats = CrawlStats::new();
        let mut page_number = 0u32;
        while let Some(batch) = pager.next_batch().await {
            if self.stopped() {
                warn!("stop requested, not dispatching further listing pages");
                break;
            }
            page_number += 1;
            stats.items_seen += batch.len() as u64;
            info!(page = page_number, moments = batch.len(), "dispatching listing page");

            let outcome = dispatch_all(&self.gate, batch, |moment| {
                let fetcher = &fetcher;
                let save_dir = &save_dir;
                async move {
                    if self.stopped() {
                        return ItemOutcome::Skipped;
                    }
                    fetcher.process(moment, save_dir).await
                }
            })
            .await;
            stats.absorb(&outcome);
        }
        stats.add_comments(fetcher.comments_fetched());

        if let Err(e) = write_run_metadata(
            &save_root.join("metadata.json"),
            Some(&user),
            &stats,
            self.config_hash.as_deref(),
        )
        .await
        {
            warn!(error = %e, "failed to write run metadata");
        }
        stats.print_summary("Moments");
        Ok(())
    }

    /// Downloads one moment by id into the standalone folder.
    pub async fn download_moment(&self, moment_id: &str, options: MomentOptions) -> Result<()> {
        let policy = self.retry_policy();
        let Some(raw) = with_retry(&policy, &self.client, "moment detail", || {
            self.client.get_moment_detail(moment_id)
        })
        .await
        else {
            println!("Could not fetch moment {}", moment_id);
            return Ok(());
        };

        let save_dir = self.download_dir().join("single_dynamics");
        tokio::fs::create_dir_all(&save_dir).await?;

        let fetcher = MomentCommentFetcher::new(
            &self.client,
            self.retry_policy(),
            options,
            self.comment_delay(),
        );

        match self.gate.run(fetcher.process(Moment::new(raw), &save_dir)).await {
            ItemOutcome::Processed => println!("Moment {} saved", moment_id),
            ItemOutcome::Skipped => println!("Moment {} was already saved", moment_id),
            ItemOutcome::Failed => println!("Failed to save moment {}", moment_id),
        }
        Ok(())
    }
}

fn format_date(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn format_datetime(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn format_duration(seconds: u64) -> String {
    if seconds == 0 {
        return "--:--".to_string();
    }
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

fn describe_failure(reason: FailureReason) -> &'static str {
    match reason {
        FailureReason::MetadataUnavailable => "metadata unavailable",
        FailureReason::NoStream => "no usable stream",
        FailureReason::MuxFailed => "muxer failed",
        FailureReason::Io => "local IO error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "--:--");
        assert_eq!(format_duration(59), "00:59");
        assert_eq!(format_duration(125), "02:05");
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date(0), "1970-01-01");
        assert_eq!(format_date(1700000000), "2023-11-14");
    }
}

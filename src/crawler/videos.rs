//! Video download flow
//!
//! Per video: fetch metadata, skip when the output folder already exists,
//! then walk the numbered sub-parts. Each sub-part resolves a ranked stream
//! list, downloads the best video track (plus the best audio track when the
//! response is DASH), hands the temp files to the external muxer, and
//! removes the temps on success and failure alike. Dialogue overlays are a
//! best-effort side channel that never fails the download.

use std::path::Path;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::api::types::{quality_label, DashStream, PageInfo, PlayInfo, VideoInfo};
use crate::api::{with_retry, BiliClient, RetryPolicy};
use crate::crawler::gate::ItemOutcome;
use crate::media::{remove_temp, Muxer};
use crate::output::naming::{danmaku_file_name, part_file_name, video_folder_name};
use crate::output::{write_danmaku_jsonl, write_video_metadata};

/// Terminal status of one video download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    /// Every sub-part downloaded (or was already present)
    Done,
    /// The output folder already existed; nothing was fetched
    AlreadyPresent,
    /// At least one sub-part failed while others succeeded
    PartialFailure,
    /// Nothing usable was produced
    Failed(FailureReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    MetadataUnavailable,
    NoStream,
    MuxFailed,
    Io,
}

impl DownloadStatus {
    pub fn as_outcome(&self) -> ItemOutcome {
        match self {
            Self::Done => ItemOutcome::Processed,
            Self::AlreadyPresent => ItemOutcome::Skipped,
            Self::PartialFailure | Self::Failed(_) => ItemOutcome::Failed,
        }
    }
}

/// Downloads videos into per-video folders.
pub struct VideoFetcher<'a> {
    client: &'a BiliClient,
    policy: RetryPolicy,
    muxer: &'a Muxer,
    download_danmaku: bool,
    preferred_quality: String,
}

impl<'a> VideoFetcher<'a> {
    pub fn new(
        client: &'a BiliClient,
        policy: RetryPolicy,
        muxer: &'a Muxer,
        download_danmaku: bool,
        preferred_quality: impl Into<String>,
    ) -> Self {
        Self {
            client,
            policy,
            muxer,
            download_danmaku,
            preferred_quality: preferred_quality.into(),
        }
    }

    /// Video metadata (typed plus the raw payload for persistence).
    pub async fn fetch_metadata(&self, bvid: &str) -> Option<(VideoInfo, Value)> {
        with_retry(&self.policy, self.client, "video view", || {
            self.client.get_video_view(bvid)
        })
        .await
    }

    /// Downloads one video into `target_dir`.
    ///
    /// The existence of the video's folder is the completion marker: when it
    /// is already there the video is skipped without any remote call. The
    /// folder is found by its stable `_<bvid>` suffix, so the skip does not
    /// even need the title.
    pub async fn download(&self, bvid: &str, target_dir: &Path) -> DownloadStatus {
        if let Some(existing) = find_existing_folder(bvid, target_dir).await {
            info!(bvid, folder = %existing.display(), "output folder exists, skipping");
            return DownloadStatus::AlreadyPresent;
        }

        let Some((info, raw)) = self.fetch_metadata(bvid).await else {
            warn!(bvid, "metadata unavailable, cannot download");
            return DownloadStatus::Failed(FailureReason::MetadataUnavailable);
        };

        info!(
            bvid,
            title = %info.title,
            owner = %info.owner.name,
            duration = info.duration,
            views = info.stat.view,
            "resolved video"
        );

        let folder = target_dir.join(video_folder_name(&info.title, bvid));
        if folder.exists() {
            // A concurrent task may have created it since the scan
            info!(bvid, folder = %folder.display(), "output folder exists, skipping");
            return DownloadStatus::AlreadyPresent;
        }
        if let Err(e) = tokio::fs::create_dir_all(&folder).await {
            error!(bvid, error = %e, "could not create video folder");
            return DownloadStatus::Failed(FailureReason::Io);
        }

        if let Err(e) = write_video_metadata(&folder, &raw).await {
            // Not fatal: the media is still worth having
            warn!(bvid, error = %e, "failed to save metadata.json");
        }

        if info.pages.is_empty() {
            warn!(bvid, "video has no sub-parts");
            return DownloadStatus::Failed(FailureReason::NoStream);
        }

        info!(bvid, parts = info.pages.len(), quality = %self.preferred_quality, "starting download");

        let mut failures = 0usize;
        let mut first_failure = None;
        for page in &info.pages {
            match self.download_part(bvid, page, &folder).await {
                Ok(()) => info!(bvid, part = page.page, "sub-part complete"),
                Err(reason) => {
                    warn!(bvid, part = page.page, ?reason, "sub-part failed");
                    failures += 1;
                    first_failure.get_or_insert(reason);
                }
            }
        }

        if failures == 0 {
            DownloadStatus::Done
        } else if failures == info.pages.len() {
            DownloadStatus::Failed(first_failure.unwrap_or(FailureReason::Io))
        } else {
            DownloadStatus::PartialFailure
        }
    }

    /// Downloads one numbered sub-part and its overlay sidecar.
    async fn download_part(
        &self,
        bvid: &str,
        page: &PageInfo,
        folder: &Path,
    ) -> std::result::Result<(), FailureReason> {
        let final_path = folder.join(part_file_name(page.page, &page.part));

        if final_path.exists() {
            info!(bvid, part = page.page, "sub-part file exists");
            // The media survived an earlier run; the sidecar may not have
            if self.download_danmaku {
                let danmaku_path = folder.join(danmaku_file_name(page.page, &page.part));
                if !danmaku_path.exists() {
                    self.fetch_part_danmaku(page, &danmaku_path).await;
                }
            }
            return Ok(());
        }

        let Some(play) = with_retry(&self.policy, self.client, "playurl", || {
            self.client.get_playurl(bvid, page.cid)
        })
        .await
        else {
            return Err(FailureReason::NoStream);
        };

        self.save_part_streams(&play, page.page, folder, &final_path)
            .await?;

        if self.download_danmaku {
            let danmaku_path = folder.join(danmaku_file_name(page.page, &page.part));
            self.fetch_part_danmaku(page, &danmaku_path).await;
        }
        Ok(())
    }

    /// Picks the best offered streams and produces the final file.
    async fn save_part_streams(
        &self,
        play: &PlayInfo,
        part_number: u32,
        folder: &Path,
        final_path: &Path,
    ) -> std::result::Result<(), FailureReason> {
        if let Some(dash) = &play.dash {
            let Some(best_video) = dash.video.first() else {
                return Err(FailureReason::NoStream);
            };
            let best_audio = dash.audio.as_ref().and_then(|tracks| tracks.first());
            info!(
                part = part_number,
                quality = %quality_label(best_video.id),
                separate_audio = best_audio.is_some(),
                "selected best streams"
            );

            let video_temp = folder.join(format!("temp_video_P{:02}.m4s", part_number));
            let audio_temp = folder.join(format!("temp_audio_P{:02}.m4s", part_number));

            let result = self
                .mux_dash(best_video, best_audio, &video_temp, &audio_temp, final_path)
                .await;
            remove_temp(&video_temp).await;
            remove_temp(&audio_temp).await;
            result
        } else if let Some(durl) = &play.durl {
            let Some(segment) = durl.first() else {
                return Err(FailureReason::NoStream);
            };
            info!(part = part_number, "single combined stream offered");

            let temp = folder.join(format!("temp_P{:02}.flv", part_number));
            let result = self.mux_single(&segment.url, &temp, final_path).await;
            remove_temp(&temp).await;
            result
        } else {
            Err(FailureReason::NoStream)
        }
    }

    async fn mux_dash(
        &self,
        video: &DashStream,
        audio: Option<&DashStream>,
        video_temp: &Path,
        audio_temp: &Path,
        final_path: &Path,
    ) -> std::result::Result<(), FailureReason> {
        if let Err(e) = self.client.download_to_file(&video.base_url, video_temp).await {
            error!(error = %e, "video track download failed");
            return Err(FailureReason::Io);
        }

        let audio_input = match audio {
            Some(track) => {
                if let Err(e) = self.client.download_to_file(&track.base_url, audio_temp).await {
                    error!(error = %e, "audio track download failed");
                    return Err(FailureReason::Io);
                }
                Some(audio_temp)
            }
            None => None,
        };

        self.muxer
            .mux(video_temp, audio_input, final_path)
            .await
            .map_err(|e| {
                error!(error = %e, "mux failed");
                FailureReason::MuxFailed
            })
    }

    async fn mux_single(
        &self,
        url: &str,
        temp: &Path,
        final_path: &Path,
    ) -> std::result::Result<(), FailureReason> {
        if let Err(e) = self.client.download_to_file(url, temp).await {
            error!(error = %e, "stream download failed");
            return Err(FailureReason::Io);
        }

        self.muxer.mux(temp, None, final_path).await.map_err(|e| {
            error!(error = %e, "repackage failed");
            FailureReason::MuxFailed
        })
    }

    /// Best-effort overlay fetch; failures are logged, never propagated.
    async fn fetch_part_danmaku(&self, page: &PageInfo, path: &Path) {
        let regular = with_retry(&self.policy, self.client, "danmaku", || {
            self.client.get_danmaku_regular(page.cid)
        })
        .await
        .unwrap_or_default();

        let special = with_retry(&self.policy, self.client, "special danmaku", || {
            self.client.get_danmaku_special(page.cid)
        })
        .await
        .unwrap_or_default();

        match write_danmaku_jsonl(path, &regular, &special).await {
            Ok(0) => debug!(part = page.page, "no overlay events to save"),
            Ok(count) => info!(part = page.page, count, "overlay events saved"),
            Err(e) => warn!(part = page.page, error = %e, "failed to save overlay events"),
        }
    }
}

/// Looks for a previous run's folder for this video by its `_<bvid>` suffix.
async fn find_existing_folder(bvid: &str, target_dir: &Path) -> Option<std::path::PathBuf> {
    let suffix = format!("_{}", bvid);
    let mut entries = tokio::fs::read_dir(target_dir).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        if name.to_string_lossy().ends_with(&suffix) {
            return Some(entry.path());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_status_maps_to_item_outcome() {
        assert_eq!(DownloadStatus::Done.as_outcome(), ItemOutcome::Processed);
        assert_eq!(
            DownloadStatus::AlreadyPresent.as_outcome(),
            ItemOutcome::Skipped
        );
        assert_eq!(
            DownloadStatus::PartialFailure.as_outcome(),
            ItemOutcome::Failed
        );
        assert_eq!(
            DownloadStatus::Failed(FailureReason::NoStream).as_outcome(),
            ItemOutcome::Failed
        );
    }

    #[tokio::test]
    async fn test_find_existing_folder_matches_by_suffix() {
        let dir = tempdir().unwrap();
        tokio::fs::create_dir(dir.path().join("Some Title_BV1abc"))
            .await
            .unwrap();

        assert!(find_existing_folder("BV1abc", dir.path()).await.is_some());
        assert!(find_existing_folder("BV1xyz", dir.path()).await.is_none());
        // A bare suffix without the separator must not match
        assert!(find_existing_folder("V1abc", dir.path()).await.is_none());
    }
}

//! HTTP client for the platform API
//!
//! This module handles all remote requests for the crawler, including:
//! - Building the shared HTTP client with proper user agent and timeouts
//! - Attaching credential cookies to every request
//! - Decoding the standard `{code, message, data}` envelope
//! - Classifying remote failures (rate limit, credential expiry, permanent)
//! - Streaming media downloads to disk
//! - The credential refresh call (serialized through the credential store)

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{COOKIE, REFERER};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use crate::api::types::{
    ApiEnvelope, CollectionKind, CollectionMeta, CollectionPage, CommentPage, MomentDetail,
    MomentFeed, PlayInfo, RefreshData, SeasonPage, SeriesMetaData, SeriesPage, SubCommentPage,
    UserInfo, VideoInfo, VideoListData, VideoSummary,
};
use crate::credential::{CredentialStore, RefreshedTokens};
use crate::{HarvestError, Result};

const REFERER_VALUE: &str = "https://www.bilibili.com";

/// Shared API client: one reqwest client plus the credential store.
#[derive(Clone)]
pub struct BiliClient {
    http: Client,
    base_url: String,
    credentials: Arc<CredentialStore>,
}

impl BiliClient {
    /// Builds the client from the API configuration.
    pub fn new(config: &crate::config::ApiConfig, credentials: Arc<CredentialStore>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            credentials,
        })
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Executes a GET against an envelope endpoint and returns its `data`.
    ///
    /// Failure classification:
    ///
    /// | Condition | Error |
    /// |-----------|-------|
    /// | HTTP 412 | `RateLimited` (transient, backed off by the retry layer) |
    /// | envelope code -352 | `CredentialExpired` (triggers a refresh) |
    /// | other non-zero code or HTTP error | permanent for this call |
    async fn get_data<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        endpoint: &'static str,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http
            .get(&url)
            .query(query)
            .header(REFERER, REFERER_VALUE);
        if let Some(cookie) = self.credentials.cookie_header().await {
            request = request.header(COOKIE, cookie);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.as_u16() == 412 {
            return Err(HarvestError::RateLimited);
        }
        if !status.is_success() {
            return Err(HarvestError::Http {
                status: status.as_u16(),
            });
        }

        let envelope: ApiEnvelope<T> = response.json().await?;
        match envelope.code {
            0 => envelope
                .data
                .ok_or(HarvestError::MalformedResponse { endpoint }),
            -352 => Err(HarvestError::CredentialExpired),
            code => Err(HarvestError::Api {
                code,
                message: envelope.message,
            }),
        }
    }

    // ===== Users =====

    pub async fn get_user_info(&self, mid: u64) -> Result<UserInfo> {
        self.get_data(
            "/x/space/acc/info",
            &[("mid", mid.to_string())],
            "user info",
        )
        .await
    }

    /// One page of a user's uploaded videos.
    pub async fn get_user_videos_page(
        &self,
        mid: u64,
        page: u32,
        page_size: usize,
    ) -> Result<Vec<VideoSummary>> {
        let data: VideoListData = self
            .get_data(
                "/x/space/arc/search",
                &[
                    ("mid", mid.to_string()),
                    ("pn", page.to_string()),
                    ("ps", page_size.to_string()),
                ],
                "user videos",
            )
            .await?;
        Ok(data.list.vlist)
    }

    // ===== Videos =====

    /// Video metadata, both typed and as the raw payload (the raw form is
    /// what gets persisted).
    pub async fn get_video_view(&self, bvid: &str) -> Result<(VideoInfo, Value)> {
        let raw: Value = self
            .get_data(
                "/x/web-interface/view",
                &[("bvid", bvid.to_string())],
                "video view",
            )
            .await?;
        let info: VideoInfo = serde_json::from_value(raw.clone())?;
        Ok((info, raw))
    }

    /// Download descriptor (ranked stream list) for one sub-part.
    pub async fn get_playurl(&self, bvid: &str, cid: u64) -> Result<PlayInfo> {
        self.get_data(
            "/x/player/playurl",
            &[
                ("bvid", bvid.to_string()),
                ("cid", cid.to_string()),
                ("fnval", "4048".to_string()),
                ("fourk", "1".to_string()),
            ],
            "playurl",
        )
        .await
    }

    pub async fn get_danmaku_regular(&self, cid: u64) -> Result<Vec<Value>> {
        self.get_data("/x/v1/dm/list", &[("oid", cid.to_string())], "danmaku")
            .await
    }

    pub async fn get_danmaku_special(&self, cid: u64) -> Result<Vec<Value>> {
        self.get_data(
            "/x/v1/dm/special",
            &[("oid", cid.to_string())],
            "special danmaku",
        )
        .await
    }

    // ===== Collections =====

    /// A user's collection listing (both schemes).
    pub async fn get_space_collections(
        &self,
        mid: u64,
        page: u32,
        page_size: usize,
    ) -> Result<crate::api::types::SpaceCollections> {
        self.get_data(
            "/x/polymer/web-space/seasons_series_list",
            &[
                ("mid", mid.to_string()),
                ("page_num", page.to_string()),
                ("page_size", page_size.to_string()),
            ],
            "space collections",
        )
        .await
    }

    /// One member page of a collection, fetched through the scheme's own
    /// endpoint and tagged with it.
    pub async fn get_collection_page(
        &self,
        kind: CollectionKind,
        collection_id: u64,
        page: u32,
        page_size: usize,
    ) -> Result<CollectionPage> {
        match kind {
            CollectionKind::Season => {
                let data: SeasonPage = self
                    .get_data(
                        "/x/polymer/web-space/seasons_archives_list",
                        &[
                            ("season_id", collection_id.to_string()),
                            ("page_num", page.to_string()),
                            ("page_size", page_size.to_string()),
                        ],
                        "season archives",
                    )
                    .await?;
                Ok(CollectionPage::Season(data))
            }
            CollectionKind::Series => {
                let data: SeriesPage = self
                    .get_data(
                        "/x/series/archives",
                        &[
                            ("series_id", collection_id.to_string()),
                            ("pn", page.to_string()),
                            ("ps", page_size.to_string()),
                        ],
                        "series archives",
                    )
                    .await?;
                Ok(CollectionPage::Series(data))
            }
        }
    }

    /// Collection metadata for naming the download folder.
    pub async fn get_collection_meta(
        &self,
        kind: CollectionKind,
        collection_id: u64,
    ) -> Result<CollectionMeta> {
        match kind {
            CollectionKind::Season => {
                let data: SeasonPage = self
                    .get_data(
                        "/x/polymer/web-space/seasons_archives_list",
                        &[
                            ("season_id", collection_id.to_string()),
                            ("page_num", "1".to_string()),
                            ("page_size", "1".to_string()),
                        ],
                        "season meta",
                    )
                    .await?;
                data.meta
                    .ok_or(HarvestError::MalformedResponse { endpoint: "season meta" })
            }
            CollectionKind::Series => {
                let data: SeriesMetaData = self
                    .get_data(
                        "/x/series/series",
                        &[("series_id", collection_id.to_string())],
                        "series meta",
                    )
                    .await?;
                Ok(data.meta)
            }
        }
    }

    // ===== Moments =====

    /// One page of a user's moment feed; an empty offset requests the head.
    pub async fn get_moments_page(&self, mid: u64, offset: &str) -> Result<MomentFeed> {
        self.get_data(
            "/x/polymer/web-dynamic/v1/feed/space",
            &[
                ("host_mid", mid.to_string()),
                ("offset", offset.to_string()),
            ],
            "moment feed",
        )
        .await
    }

    pub async fn get_moment_detail(&self, moment_id: &str) -> Result<Value> {
        let data: MomentDetail = self
            .get_data(
                "/x/polymer/web-dynamic/v1/detail",
                &[("id", moment_id.to_string())],
                "moment detail",
            )
            .await?;
        Ok(data.item)
    }

    // ===== Comments =====

    /// One cursor page of root comments for a comment area.
    pub async fn get_root_comments(
        &self,
        oid: &str,
        comment_type: i64,
        offset: &str,
    ) -> Result<CommentPage> {
        self.get_data(
            "/x/v2/reply/main",
            &[
                ("oid", oid.to_string()),
                ("type", comment_type.to_string()),
                ("offset", offset.to_string()),
            ],
            "root comments",
        )
        .await
    }

    /// One numbered page of nested replies under a root comment.
    pub async fn get_sub_comments(
        &self,
        oid: &str,
        comment_type: i64,
        root: i64,
        page: u32,
        page_size: usize,
    ) -> Result<SubCommentPage> {
        self.get_data(
            "/x/v2/reply/reply",
            &[
                ("oid", oid.to_string()),
                ("type", comment_type.to_string()),
                ("root", root.to_string()),
                ("pn", page.to_string()),
                ("ps", page_size.to_string()),
            ],
            "sub comments",
        )
        .await
    }

    // ===== Media =====

    /// Streams a media URL to a file on disk.
    pub async fn download_to_file(&self, url: &str, path: &Path) -> Result<u64> {
        let mut request = self.http.get(url).header(REFERER, REFERER_VALUE);
        if let Some(cookie) = self.credentials.cookie_header().await {
            request = request.header(COOKIE, cookie);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HarvestError::Http {
                status: status.as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(path).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }

    // ===== Credential refresh =====

    /// Refreshes the credential through the store's single-flight gate.
    ///
    /// Concurrent callers collapse into one remote call; the refreshed
    /// tokens are visible to every subsequent request.
    pub async fn refresh_credential(&self) -> Result<()> {
        self.credentials
            .refresh_with(|csrf, refresh_token| async move {
                let url = format!("{}/x/passport-login/web/cookie/refresh", self.base_url);
                let response = self
                    .http
                    .post(&url)
                    .header(REFERER, REFERER_VALUE)
                    .form(&[("csrf", csrf.as_str()), ("refresh_token", refresh_token.as_str())])
                    .send()
                    .await?;

                let status = response.status();
                if !status.is_success() {
                    return Err(HarvestError::RefreshFailed(format!("HTTP {}", status)));
                }

                let envelope: ApiEnvelope<RefreshData> = response.json().await?;
                if envelope.code != 0 {
                    return Err(HarvestError::RefreshFailed(format!(
                        "code {}: {}",
                        envelope.code, envelope.message
                    )));
                }
                let data = envelope.data.ok_or(HarvestError::MalformedResponse {
                    endpoint: "credential refresh",
                })?;

                Ok(RefreshedTokens {
                    sessdata: data.sessdata,
                    bili_jct: data.bili_jct,
                    refresh_token: data.refresh_token,
                })
            })
            .await
    }
}

//! Wire types for the platform API
//!
//! Every endpoint responds with the same envelope (`code`, `message`,
//! `data`); the shapes below model only the fields this crate consumes.
//! Payloads that end up in persisted artifacts (moment bodies, comment
//! replies) are kept as raw `serde_json::Value` so nothing is lost on the
//! way to disk.

use serde::Deserialize;
use serde_json::Value;

/// Standard response envelope wrapping every endpoint's payload
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

// ===== Users =====

/// User identity as returned by the account-info endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub mid: u64,
    #[serde(default)]
    pub name: String,
}

// ===== User video listing =====

#[derive(Debug, Deserialize)]
pub struct VideoListData {
    #[serde(default)]
    pub list: VideoList,
}

#[derive(Debug, Default, Deserialize)]
pub struct VideoList {
    #[serde(default)]
    pub vlist: Vec<VideoSummary>,
}

/// One uploaded video in a user's listing
#[derive(Debug, Clone, Deserialize)]
pub struct VideoSummary {
    pub bvid: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub created: i64,
    // The play counter is occasionally the string "--" for hidden stats
    #[serde(default)]
    pub play: Value,
}

impl VideoSummary {
    pub fn play_count(&self) -> i64 {
        self.play.as_i64().unwrap_or(0)
    }
}

// ===== Video metadata =====

/// Video metadata from the view endpoint, including its sub-parts
#[derive(Debug, Clone, Deserialize)]
pub struct VideoInfo {
    pub bvid: String,
    pub title: String,
    #[serde(default)]
    pub owner: Owner,
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub stat: Stat,
    #[serde(default)]
    pub pages: Vec<PageInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Owner {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Stat {
    #[serde(default)]
    pub view: i64,
}

/// One numbered sub-part of a video
#[derive(Debug, Clone, Deserialize)]
pub struct PageInfo {
    pub cid: u64,
    pub page: u32,
    #[serde(default)]
    pub part: String,
    #[serde(default)]
    pub duration: u64,
}

// ===== Download descriptors =====

/// Stream descriptors returned by the playurl endpoint.
///
/// DASH responses carry separate ranked video/audio track lists; legacy
/// FLV/MP4 responses carry a single `durl` segment list instead.
#[derive(Debug, Clone, Deserialize)]
pub struct PlayInfo {
    #[serde(default)]
    pub dash: Option<DashStreams>,
    #[serde(default)]
    pub durl: Option<Vec<DurlSegment>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashStreams {
    #[serde(default)]
    pub video: Vec<DashStream>,
    #[serde(default)]
    pub audio: Option<Vec<DashStream>>,
}

/// One DASH track; the list is ranked best-first by the server
#[derive(Debug, Clone, Deserialize)]
pub struct DashStream {
    #[serde(default)]
    pub id: u32,
    #[serde(alias = "baseUrl")]
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DurlSegment {
    pub url: String,
}

/// Human-readable label for a quality code, for log output only
pub fn quality_label(id: u32) -> String {
    match id {
        16 => "360P".to_string(),
        32 => "480P".to_string(),
        64 => "720P".to_string(),
        80 => "1080P".to_string(),
        112 => "1080P+".to_string(),
        116 => "1080P60".to_string(),
        120 => "4K".to_string(),
        125 => "HDR".to_string(),
        126 => "Dolby Vision".to_string(),
        127 => "8K".to_string(),
        other => format!("quality code {}", other),
    }
}

// ===== Collections =====

/// The two incompatible collection schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    /// Newer grouping; member pages carry an `episodes` array
    Season,
    /// Legacy grouping; member pages carry an `archives` array
    Series,
}

impl CollectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Season => "season",
            Self::Series => "series",
        }
    }
}

impl std::fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One member page of a collection, resolved to its scheme at detection time
#[derive(Debug)]
pub enum CollectionPage {
    Season(SeasonPage),
    Series(SeriesPage),
}

impl CollectionPage {
    /// True when the scheme's marker field is present in the response
    pub fn has_marker(&self) -> bool {
        match self {
            Self::Season(page) => page.episodes.is_some(),
            Self::Series(page) => page.archives.is_some(),
        }
    }

    /// Consumes the page and returns its entries (empty when the marker is
    /// absent)
    pub fn into_entries(self) -> Vec<CollectionEntry> {
        match self {
            Self::Season(page) => page.episodes.unwrap_or_default(),
            Self::Series(page) => page.archives.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SeasonPage {
    #[serde(default)]
    pub episodes: Option<Vec<CollectionEntry>>,
    #[serde(default)]
    pub meta: Option<CollectionMeta>,
}

#[derive(Debug, Deserialize)]
pub struct SeriesPage {
    #[serde(default)]
    pub archives: Option<Vec<CollectionEntry>>,
}

/// One collection member in either scheme's shape
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionEntry {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub bvid: String,
    #[serde(default)]
    pub aid: u64,
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub stat: Stat,
    #[serde(default)]
    pub pubdate: i64,
}

/// Collection metadata, shared across both schemes' meta shapes
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectionMeta {
    #[serde(alias = "season_id", alias = "series_id", default)]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(alias = "intro", default)]
    pub description: String,
    #[serde(alias = "ep_count", default)]
    pub total: u64,
    #[serde(alias = "ctime", alias = "ptime", default)]
    pub created: i64,
}

#[derive(Debug, Deserialize)]
pub struct SeriesMetaData {
    pub meta: CollectionMeta,
}

/// A user's collection listing (both schemes side by side)
#[derive(Debug, Default, Deserialize)]
pub struct SpaceCollections {
    #[serde(default)]
    pub items_lists: ItemsLists,
}

#[derive(Debug, Default, Deserialize)]
pub struct ItemsLists {
    #[serde(default)]
    pub seasons_list: Vec<CollectionMetaItem>,
    #[serde(default)]
    pub series_list: Vec<CollectionMetaItem>,
}

#[derive(Debug, Deserialize)]
pub struct CollectionMetaItem {
    pub meta: CollectionMeta,
}

// ===== Moments =====

/// One page of a user's moment feed
#[derive(Debug, Deserialize)]
pub struct MomentFeed {
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(default)]
    pub offset: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Deserialize)]
pub struct MomentDetail {
    pub item: Value,
}

/// A social moment, kept as the raw payload it arrived in.
///
/// The payload is persisted verbatim; these accessors only pick out the
/// fields the crawl flow needs.
#[derive(Debug, Clone)]
pub struct Moment {
    pub raw: Value,
}

impl Moment {
    pub fn new(raw: Value) -> Self {
        Self { raw }
    }

    pub fn id(&self) -> Option<&str> {
        self.raw.get("id_str").and_then(Value::as_str)
    }

    pub fn type_tag(&self) -> &str {
        self.raw
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("UNKNOWN")
    }

    /// Comment-area object id, from the moment's embedded basic block
    pub fn comment_oid(&self) -> Option<&str> {
        self.raw
            .get("basic")
            .and_then(|b| b.get("comment_id_str"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Comment-area resource type; 17 (plain dynamic) when absent
    pub fn comment_type(&self) -> i64 {
        self.raw
            .get("basic")
            .and_then(|b| b.get("comment_type"))
            .and_then(Value::as_i64)
            .unwrap_or(17)
    }

    pub fn pub_ts(&self) -> i64 {
        self.raw
            .pointer("/modules/module_author/pub_ts")
            .and_then(Value::as_i64)
            .unwrap_or(0)
    }

    /// Best-effort short description for listings
    pub fn summary_text(&self) -> Option<&str> {
        self.raw
            .pointer("/modules/module_dynamic/desc/text")
            .and_then(Value::as_str)
            .or_else(|| {
                self.raw
                    .pointer("/modules/module_dynamic/major/opus/summary/text")
                    .and_then(Value::as_str)
            })
            .or_else(|| {
                self.raw
                    .pointer("/modules/module_dynamic/major/opus/title")
                    .and_then(Value::as_str)
            })
    }
}

// ===== Comments =====

/// One page of root comments under a moment
#[derive(Debug, Deserialize)]
pub struct CommentPage {
    #[serde(default)]
    pub replies: Vec<Value>,
    #[serde(default)]
    pub cursor: Option<CommentCursor>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CommentCursor {
    #[serde(default)]
    pub next: Option<i64>,
    #[serde(default)]
    pub is_end: bool,
}

#[derive(Debug, Deserialize)]
pub struct SubCommentPage {
    #[serde(default)]
    pub replies: Vec<Value>,
}

/// Nested-reply count of a raw root comment
pub fn reply_rcount(reply: &Value) -> i64 {
    reply.get("rcount").and_then(Value::as_i64).unwrap_or(0)
}

/// Comment id of a raw root comment
pub fn reply_rpid(reply: &Value) -> Option<i64> {
    reply.get("rpid").and_then(Value::as_i64)
}

// ===== Credential refresh =====

#[derive(Debug, Deserialize)]
pub struct RefreshData {
    #[serde(default)]
    pub sessdata: String,
    #[serde(default)]
    pub bili_jct: String,
    #[serde(default)]
    pub refresh_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_decodes_data() {
        let raw = json!({"code": 0, "message": "0", "data": {"mid": 42, "name": "tester"}});
        let envelope: ApiEnvelope<UserInfo> = serde_json::from_value(raw).unwrap();
        assert_eq!(envelope.code, 0);
        let user = envelope.data.unwrap();
        assert_eq!(user.mid, 42);
        assert_eq!(user.name, "tester");
    }

    #[test]
    fn test_dash_stream_accepts_both_url_spellings() {
        let snake: DashStream =
            serde_json::from_value(json!({"id": 80, "base_url": "https://a/v"})).unwrap();
        let camel: DashStream =
            serde_json::from_value(json!({"id": 80, "baseUrl": "https://a/v"})).unwrap();
        assert_eq!(snake.base_url, camel.base_url);
    }

    #[test]
    fn test_collection_page_marker() {
        let season: SeasonPage = serde_json::from_value(json!({"episodes": []})).unwrap();
        assert!(CollectionPage::Season(season).has_marker());

        let season: SeasonPage = serde_json::from_value(json!({"total": 3})).unwrap();
        assert!(!CollectionPage::Season(season).has_marker());

        let series: SeriesPage =
            serde_json::from_value(json!({"archives": [{"bvid": "BV1"}]})).unwrap();
        let page = CollectionPage::Series(series);
        assert!(page.has_marker());
        assert_eq!(page.into_entries().len(), 1);
    }

    #[test]
    fn test_collection_meta_aliases() {
        let meta: CollectionMeta = serde_json::from_value(
            json!({"season_id": 9, "name": "s", "ep_count": 12, "ptime": 100}),
        )
        .unwrap();
        assert_eq!(meta.id, 9);
        assert_eq!(meta.total, 12);
        assert_eq!(meta.created, 100);
    }

    #[test]
    fn test_moment_accessors() {
        let moment = Moment::new(json!({
            "id_str": "998",
            "type": "DYNAMIC_TYPE_DRAW",
            "basic": {"comment_id_str": "556", "comment_type": 11},
            "modules": {
                "module_author": {"pub_ts": 1700000000},
                "module_dynamic": {"desc": {"text": "hello"}}
            }
        }));
        assert_eq!(moment.id(), Some("998"));
        assert_eq!(moment.type_tag(), "DYNAMIC_TYPE_DRAW");
        assert_eq!(moment.comment_oid(), Some("556"));
        assert_eq!(moment.comment_type(), 11);
        assert_eq!(moment.pub_ts(), 1700000000);
        assert_eq!(moment.summary_text(), Some("hello"));
    }

    #[test]
    fn test_moment_defaults_when_fields_missing() {
        let moment = Moment::new(json!({"id_str": "1"}));
        assert_eq!(moment.type_tag(), "UNKNOWN");
        assert_eq!(moment.comment_oid(), None);
        assert_eq!(moment.comment_type(), 17);
    }

    #[test]
    fn test_play_count_tolerates_hidden_stat() {
        let hidden: VideoSummary =
            serde_json::from_value(json!({"bvid": "BV1", "play": "--"})).unwrap();
        assert_eq!(hidden.play_count(), 0);

        let visible: VideoSummary =
            serde_json::from_value(json!({"bvid": "BV1", "play": 1234})).unwrap();
        assert_eq!(visible.play_count(), 1234);
    }
}

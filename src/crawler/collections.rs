//! Collection resolution and member listing
//!
//! Collections exist in two incompatible upstream schemes ("season" and
//! "series"). The resolver probes which one a given id belongs to, then
//! paginates the member list and normalizes both shapes into one item type,
//! so downstream code never re-inspects the scheme.

use tracing::{info, warn};

use crate::api::types::{CollectionEntry, CollectionKind, CollectionMeta};
use crate::api::{with_retry, BiliClient, RetryPolicy};
use crate::config::DetectFailurePolicy;
use crate::crawler::pager::{NumberedPager, PagerSettings};
use crate::{HarvestError, Result};

/// Member pages are requested at this fixed size.
pub const COLLECTION_PAGE_SIZE: usize = 100;

/// One collection member, normalized across both schemes.
#[derive(Debug, Clone)]
pub struct CollectionVideo {
    pub title: String,
    pub bvid: String,
    pub aid: u64,
    pub duration: u64,
    pub views: i64,
    pub published: i64,
}

impl From<CollectionEntry> for CollectionVideo {
    fn from(entry: CollectionEntry) -> Self {
        Self {
            title: entry.title,
            bvid: entry.bvid,
            aid: entry.aid,
            duration: entry.duration,
            views: entry.stat.view,
            published: entry.pubdate,
        }
    }
}

/// Resolves collection ids to their scheme and lists their members.
pub struct CollectionResolver<'a> {
    client: &'a BiliClient,
    policy: RetryPolicy,
    on_detect_failure: DetectFailurePolicy,
}

impl<'a> CollectionResolver<'a> {
    pub fn new(
        client: &'a BiliClient,
        policy: RetryPolicy,
        on_detect_failure: DetectFailurePolicy,
    ) -> Self {
        Self {
            client,
            policy,
            on_detect_failure,
        }
    }

    /// Determines the scheme of a collection.
    ///
    /// An explicitly requested kind short-circuits detection. Otherwise the
    /// season scheme is probed first with a single one-item page, then the
    /// series scheme; a probe counts only when the response carries the
    /// scheme's marker field. When both probes fail the configured policy
    /// decides between an explicit error and assuming the legacy scheme.
    pub async fn resolve_kind(
        &self,
        collection_id: u64,
        requested: Option<CollectionKind>,
    ) -> Result<CollectionKind> {
        if let Some(kind) = requested {
            return Ok(kind);
        }

        if self.probe(CollectionKind::Season, collection_id).await {
            info!(collection_id, "detected season collection");
            return Ok(CollectionKind::Season);
        }
        if self.probe(CollectionKind::Series, collection_id).await {
            info!(collection_id, "detected series collection");
            return Ok(CollectionKind::Series);
        }

        match self.on_detect_failure {
            DetectFailurePolicy::Error => Err(HarvestError::DetectFailed { collection_id }),
            DetectFailurePolicy::AssumeSeries => {
                warn!(
                    collection_id,
                    "could not detect collection type, assuming the legacy series scheme"
                );
                Ok(CollectionKind::Series)
            }
        }
    }

    async fn probe(&self, kind: CollectionKind, collection_id: u64) -> bool {
        info!(collection_id, kind = %kind, "probing collection scheme");
        match with_retry(&self.policy, self.client, "collection probe", || {
            self.client.get_collection_page(kind, collection_id, 1, 1)
        })
        .await
        {
            Some(page) if page.has_marker() => true,
            Some(_) => {
                info!(collection_id, kind = %kind, "probe response lacked the scheme marker");
                false
            }
            None => false,
        }
    }

    /// Collection metadata; `None` when the endpoint has nothing usable.
    pub async fn meta(&self, kind: CollectionKind, collection_id: u64) -> Option<CollectionMeta> {
        with_retry(&self.policy, self.client, "collection meta", || {
            self.client.get_collection_meta(kind, collection_id)
        })
        .await
    }

    /// Lists every member of the collection, normalized.
    pub async fn list_members(
        &self,
        kind: CollectionKind,
        collection_id: u64,
        settings: PagerSettings,
    ) -> Vec<CollectionVideo> {
        let fetch = |page: u32| {
            let client = self.client;
            let policy = &self.policy;
            async move {
                with_retry(policy, client, "collection page", || {
                    client.get_collection_page(kind, collection_id, page, COLLECTION_PAGE_SIZE)
                })
                .await
                .map(|page| {
                    page.into_entries()
                        .into_iter()
                        .map(CollectionVideo::from)
                        .collect()
                })
            }
        };

        NumberedPager::new(COLLECTION_PAGE_SIZE, settings, fetch)
            .collect()
            .await
    }
}

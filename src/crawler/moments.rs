//! Moments and comments flow
//!
//! Per moment: skip when its artifact file already exists, otherwise fetch
//! the full root-comment tree (opaque-offset cursor) with an optional
//! ceiling, optionally expand every reply thread, and write a single JSON
//! document once all pages are in. A failed comment page ends collection
//! for that moment but keeps what was already fetched.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::api::types::{reply_rcount, reply_rpid, Moment};
use crate::api::{with_retry, BiliClient, RetryPolicy};
use crate::config::{MomentsConfig, ReplyFetch};
use crate::crawler::gate::ItemOutcome;
use crate::crawler::pager::{NumberedPager, PagerSettings};
use crate::output::{moment_artifact_path, write_moment_document, MomentComments};

/// Reply threads are paginated at this fixed size.
pub const SUB_COMMENT_PAGE_SIZE: usize = 20;

/// Caller-selected options for one moments run.
#[derive(Debug, Clone)]
pub struct MomentOptions {
    pub include_comments: bool,
    /// Per-moment root-comment ceiling; `None` is unlimited
    pub comment_ceiling: Option<u64>,
    pub reply_fetch: ReplyFetch,
}

impl MomentOptions {
    pub fn from_config(config: &MomentsConfig) -> Self {
        Self {
            include_comments: config.include_comments,
            comment_ceiling: config.comment_ceiling(),
            reply_fetch: config.reply_fetch,
        }
    }
}

/// Processes moments into per-moment JSON artifacts.
pub struct MomentCommentFetcher<'a> {
    client: &'a BiliClient,
    policy: RetryPolicy,
    options: MomentOptions,
    comment_delay: Duration,
    comments_fetched: AtomicU64,
}

impl<'a> MomentCommentFetcher<'a> {
    pub fn new(
        client: &'a BiliClient,
        policy: RetryPolicy,
        options: MomentOptions,
        comment_delay: Duration,
    ) -> Self {
        Self {
            client,
            policy,
            options,
            comment_delay,
            comments_fetched: AtomicU64::new(0),
        }
    }

    /// Total root comments fetched by this fetcher so far.
    pub fn comments_fetched(&self) -> u64 {
        self.comments_fetched.load(Ordering::Relaxed)
    }

    /// Processes one moment end to end.
    ///
    /// The artifact file's existence is the idempotency marker: when it is
    /// already on disk the moment is skipped without any remote call. The
    /// document is written only after every comment page has been fetched.
    pub async fn process(&self, moment: Moment, save_dir: &Path) -> ItemOutcome {
        let Some(moment_id) = moment.id().map(str::to_string) else {
            error!("moment without id_str cannot be persisted");
            return ItemOutcome::Failed;
        };

        let artifact = moment_artifact_path(save_dir, &moment_id);
        if artifact.exists() {
            info!(moment_id, "artifact exists, skipping");
            return ItemOutcome::Skipped;
        }

        let comments = if self.options.include_comments {
            match moment.comment_oid() {
                Some(oid) => self.fetch_comments(oid, moment.comment_type()).await,
                None => {
                    debug!(moment_id, "moment has no comment area");
                    MomentComments::default()
                }
            }
        } else {
            MomentComments::default()
        };

        match write_moment_document(save_dir, &moment_id, &moment, &comments).await {
            Ok(path) => {
                info!(
                    moment_id,
                    comments = comments.total_count,
                    path = %path.display(),
                    "moment saved"
                );
                ItemOutcome::Processed
            }
            Err(e) => {
                error!(moment_id, error = %e, "failed to save moment");
                ItemOutcome::Failed
            }
        }
    }

    /// Collects the comment tree for one comment area.
    pub async fn fetch_comments(&self, oid: &str, comment_type: i64) -> MomentComments {
        let mut comments = MomentComments::default();
        let mut offset = String::new();
        let mut seen: u64 = 0;

        'pages: loop {
            let Some(page) = with_retry(&self.policy, self.client, "root comments", || {
                self.client.get_root_comments(oid, comment_type, &offset)
            })
            .await
            else {
                // Keep the partial tree rather than discarding it
                break;
            };

            if page.replies.is_empty() {
                break;
            }

            for reply in page.replies {
                seen += 1;
                if let Some(ceiling) = self.options.comment_ceiling {
                    if seen > ceiling {
                        warn!(oid, ceiling, "comment ceiling reached, stopping collection");
                        break 'pages;
                    }
                }

                if self.options.reply_fetch == ReplyFetch::Full && reply_rcount(&reply) > 0 {
                    if let Some(rpid) = reply_rpid(&reply) {
                        let replies = self.fetch_sub_comments(oid, comment_type, rpid).await;
                        if !replies.is_empty() {
                            comments.sub_comments.insert(rpid.to_string(), replies);
                        }
                    }
                }

                comments.root_comments.push(reply);
            }

            match page.cursor {
                Some(cursor) if !cursor.is_end => match cursor.next {
                    Some(next) => offset = next.to_string(),
                    None => break,
                },
                _ => break,
            }

            if !self.comment_delay.is_zero() {
                tokio::time::sleep(self.comment_delay).await;
            }
        }

        comments.total_count = comments.root_comments.len() as u64;
        self.comments_fetched
            .fetch_add(comments.total_count, Ordering::Relaxed);
        comments
    }

    /// Exhaustively paginates one reply thread.
    async fn fetch_sub_comments(&self, oid: &str, comment_type: i64, root: i64) -> Vec<Value> {
        let fetch = |page: u32| {
            let client = self.client;
            let policy = &self.policy;
            async move {
                with_retry(policy, client, "sub comments", || {
                    client.get_sub_comments(oid, comment_type, root, page, SUB_COMMENT_PAGE_SIZE)
                })
                .await
                .map(|page| page.replies)
            }
        };

        let settings = PagerSettings {
            inter_page_delay: self.comment_delay,
            ..PagerSettings::default()
        };
        NumberedPager::new(SUB_COMMENT_PAGE_SIZE, settings, fetch)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MomentsConfig;

    #[test]
    fn test_options_from_config() {
        let config = MomentsConfig::default();
        let options = MomentOptions::from_config(&config);
        assert!(options.include_comments);
        assert_eq!(options.comment_ceiling, None);
        assert_eq!(options.reply_fetch, ReplyFetch::Inline);
    }

    #[test]
    fn test_ceiling_conversion() {
        let config = MomentsConfig {
            max_comments: 250,
            ..MomentsConfig::default()
        };
        assert_eq!(
            MomentOptions::from_config(&config).comment_ceiling,
            Some(250)
        );
    }
}

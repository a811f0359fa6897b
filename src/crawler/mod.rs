//! Crawl engine
//!
//! This module contains the core crawling logic, including:
//! - Lazy pagination over unstable listing endpoints
//! - Concurrency gating and batch dispatch of item operations
//! - The per-domain item processors (videos, collections, moments)
//! - Overall crawl coordination and statistics

mod collections;
mod coordinator;
mod gate;
mod moments;
mod pager;
mod videos;

pub use collections::{CollectionResolver, CollectionVideo, COLLECTION_PAGE_SIZE};
pub use coordinator::Coordinator;
pub use gate::{dispatch_all, BatchOutcome, ConcurrencyGate, ItemOutcome};
pub use moments::{MomentCommentFetcher, MomentOptions, SUB_COMMENT_PAGE_SIZE};
pub use pager::{CursorBatch, CursorPager, NumberedPager, PagerSettings};
pub use videos::{DownloadStatus, FailureReason, VideoFetcher};

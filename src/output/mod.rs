//! Output artifacts and run statistics
//!
//! This module owns everything the crawler leaves on disk apart from the
//! media files themselves: artifact naming, the JSON writers, and the
//! end-of-run statistics.

pub mod artifacts;
pub mod naming;
pub mod stats;

pub use artifacts::{
    moment_artifact_path, write_danmaku_jsonl, write_moment_document, write_video_metadata,
    MomentComments,
};
pub use stats::{write_run_metadata, CrawlStats};

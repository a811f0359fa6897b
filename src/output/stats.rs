//! Crawl statistics and the run-level metadata artifact
//!
//! Counters are scoped to one coordinator run and flow back up from batch
//! outcomes; at the end of the run they are printed as a summary and
//! persisted alongside the downloaded artifacts.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::api::types::UserInfo;
use crate::crawler::BatchOutcome;
use crate::Result;

/// Aggregate counters for one crawl run.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlStats {
    /// Work items produced by the listing stage
    pub items_seen: u64,
    /// Items fully processed in this run
    pub processed: u64,
    /// Items skipped because their artifact already existed
    pub skipped: u64,
    /// Items that failed
    pub failed: u64,
    /// Comments fetched across all moments
    pub comments_fetched: u64,
    pub started_at: DateTime<Utc>,
}

impl Default for CrawlStats {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlStats {
    pub fn new() -> Self {
        Self {
            items_seen: 0,
            processed: 0,
            skipped: 0,
            failed: 0,
            comments_fetched: 0,
            started_at: Utc::now(),
        }
    }

    /// Folds one batch outcome into the run totals.
    pub fn absorb(&mut self, outcome: &BatchOutcome) {
        self.processed += outcome.processed;
        self.skipped += outcome.skipped;
        self.failed += outcome.failed;
    }

    pub fn add_comments(&mut self, count: u64) {
        self.comments_fetched += count;
    }

    /// Prints the end-of-run summary.
    pub fn print_summary(&self, label: &str) {
        let elapsed = Utc::now().signed_duration_since(self.started_at);

        println!("\n=== {} summary ===", label);
        println!("  Items found:    {}", self.items_seen);
        println!("  Processed:      {}", self.processed);
        println!("  Skipped:        {}", self.skipped);
        println!("  Failed:         {}", self.failed);
        if self.comments_fetched > 0 {
            println!("  Comments:       {}", self.comments_fetched);
        }
        println!("  Elapsed:        {}s", elapsed.num_seconds());
    }
}

/// Writes the run-level `metadata.json` summarizing the crawl.
pub async fn write_run_metadata(
    path: &Path,
    user: Option<&UserInfo>,
    stats: &CrawlStats,
    config_hash: Option<&str>,
) -> Result<()> {
    let metadata = json!({
        "user_info": user.map(|u| json!({"mid": u.mid, "name": u.name})),
        "crawl_stats": stats,
        "crawl_time": Utc::now().to_rfc3339(),
        "config_hash": config_hash,
    });
    tokio::fs::write(path, serde_json::to_vec_pretty(&metadata)?).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::tempdir;

    #[test]
    fn test_absorb_accumulates_outcomes() {
        let mut stats = CrawlStats::new();
        stats.absorb(&BatchOutcome {
            processed: 3,
            skipped: 1,
            failed: 1,
        });
        stats.absorb(&BatchOutcome {
            processed: 2,
            skipped: 0,
            failed: 0,
        });

        assert_eq!(stats.processed, 5);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn test_run_metadata_written() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        let mut stats = CrawlStats::new();
        stats.items_seen = 7;
        stats.processed = 6;
        stats.add_comments(40);

        let user = UserInfo {
            mid: 9,
            name: "tester".to_string(),
        };
        write_run_metadata(&path, Some(&user), &stats, Some("abc123"))
            .await
            .unwrap();

        let written: Value =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(written["user_info"]["mid"], 9);
        assert_eq!(written["crawl_stats"]["items_seen"], 7);
        assert_eq!(written["crawl_stats"]["comments_fetched"], 40);
        assert_eq!(written["config_hash"], "abc123");
    }
}

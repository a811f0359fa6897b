//! Persisted artifact writers
//!
//! Artifacts are plain JSON files keyed by stable ids; their presence on
//! disk is what makes a rerun skip the corresponding item without touching
//! the network.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::api::types::Moment;
use crate::output::naming::moment_file_name;
use crate::Result;

/// Writes a video folder's `metadata.json`: the raw video payload, its
/// sub-part list, and the crawl timestamp.
pub async fn write_video_metadata(folder: &Path, info_raw: &Value) -> Result<()> {
    let metadata = json!({
        "video_info": info_raw,
        "pages_info": info_raw.get("pages").cloned().unwrap_or_else(|| json!([])),
        "download_time": Utc::now().to_rfc3339(),
        "downloader_version": concat!("bili-harvest ", env!("CARGO_PKG_VERSION")),
    });
    tokio::fs::write(
        folder.join("metadata.json"),
        serde_json::to_vec_pretty(&metadata)?,
    )
    .await?;
    Ok(())
}

/// Writes a sub-part's dialogue-overlay sidecar: one JSON object per line,
/// each tagged with its event class. Nothing is written when there are no
/// events.
///
/// Returns the number of events written.
pub async fn write_danmaku_jsonl(
    path: &Path,
    regular: &[Value],
    special: &[Value],
) -> Result<usize> {
    let total = regular.len() + special.len();
    if total == 0 {
        return Ok(0);
    }

    let mut lines = String::new();
    for (events, tag) in [(regular, "regular"), (special, "special")] {
        for event in events {
            let mut event = event.clone();
            if let Some(object) = event.as_object_mut() {
                object.insert("type".to_string(), json!(tag));
            }
            lines.push_str(&serde_json::to_string(&event)?);
            lines.push('\n');
        }
    }

    tokio::fs::write(path, lines).await?;
    Ok(total)
}

/// Comment tree collected for one moment.
#[derive(Debug, Default, Serialize)]
pub struct MomentComments {
    pub root_comments: Vec<Value>,
    pub sub_comments: BTreeMap<String, Vec<Value>>,
    pub total_count: u64,
}

/// Path of the artifact that marks a moment as processed.
pub fn moment_artifact_path(dir: &Path, moment_id: &str) -> PathBuf {
    dir.join(moment_file_name(moment_id))
}

/// Writes the single document for one moment: the raw payload, its comment
/// tree, and crawl metadata. Called only once every comment page for the
/// moment has been fetched.
pub async fn write_moment_document(
    dir: &Path,
    moment_id: &str,
    moment: &Moment,
    comments: &MomentComments,
) -> Result<PathBuf> {
    let document = json!({
        "dynamic_info": moment.raw,
        "comments": comments,
        "metadata": {
            "crawl_time": Utc::now().to_rfc3339(),
            "total_comments": comments.total_count,
            "dynamic_type": moment.type_tag(),
            "dynamic_id": moment_id,
        },
    });

    let path = moment_artifact_path(dir, moment_id);
    tokio::fs::write(&path, serde_json::to_vec_pretty(&document)?).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_video_metadata_includes_pages_and_timestamp() {
        let dir = tempdir().unwrap();
        let raw = json!({"bvid": "BV1", "title": "t", "pages": [{"cid": 1, "page": 1}]});

        write_video_metadata(dir.path(), &raw).await.unwrap();

        let written: Value = serde_json::from_slice(
            &tokio::fs::read(dir.path().join("metadata.json")).await.unwrap(),
        )
        .unwrap();
        assert_eq!(written["video_info"]["bvid"], "BV1");
        assert_eq!(written["pages_info"][0]["cid"], 1);
        assert!(written["download_time"].is_string());
    }

    #[tokio::test]
    async fn test_danmaku_lines_are_tagged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("P01_x_danmaku.jsonl");

        let written = write_danmaku_jsonl(
            &path,
            &[json!({"text": "hi", "time": 1.5})],
            &[json!({"content": "bas"})],
        )
        .await
        .unwrap();
        assert_eq!(written, 2);

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "regular");
        assert_eq!(lines[0]["text"], "hi");
        assert_eq!(lines[1]["type"], "special");
    }

    #[tokio::test]
    async fn test_danmaku_skips_write_when_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty_danmaku.jsonl");
        let written = write_danmaku_jsonl(&path, &[], &[]).await.unwrap();
        assert_eq!(written, 0);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_moment_document_shape() {
        let dir = tempdir().unwrap();
        let moment = Moment::new(json!({"id_str": "42", "type": "DYNAMIC_TYPE_WORD"}));
        let mut comments = MomentComments::default();
        comments.root_comments.push(json!({"rpid": 1, "message": "first"}));
        comments
            .sub_comments
            .insert("1".to_string(), vec![json!({"rpid": 2})]);
        comments.total_count = 1;

        let path = write_moment_document(dir.path(), "42", &moment, &comments)
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("dynamic_42.json"));

        let written: Value =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(written["dynamic_info"]["id_str"], "42");
        assert_eq!(written["comments"]["total_count"], 1);
        assert_eq!(written["comments"]["sub_comments"]["1"][0]["rpid"], 2);
        assert_eq!(written["metadata"]["dynamic_type"], "DYNAMIC_TYPE_WORD");
        assert_eq!(written["metadata"]["dynamic_id"], "42");
    }
}

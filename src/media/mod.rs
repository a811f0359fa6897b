//! External muxer invocation
//!
//! Downloaded DASH tracks (one video-only, optionally one audio-only) are
//! combined into the final container by an external ffmpeg process; legacy
//! single-track downloads are repackaged the same way. Success is exit code
//! zero. Temp inputs are removed by the caller on every path.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use crate::{HarvestError, Result};

/// Wrapper around the external muxer binary.
///
/// The program name is injectable so tests can substitute a stub.
#[derive(Debug, Clone)]
pub struct Muxer {
    program: String,
}

impl Default for Muxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Muxer {
    pub fn new() -> Self {
        Self {
            program: "ffmpeg".to_string(),
        }
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Probes whether the muxer binary is runnable.
    pub async fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Muxes one or two input tracks into the output container.
    ///
    /// With an audio track the streams are combined; without one the single
    /// input is repackaged. Streams are copied, never re-encoded.
    pub async fn mux(&self, video: &Path, audio: Option<&Path>, output: &Path) -> Result<()> {
        let mut command = Command::new(&self.program);
        command.arg("-i").arg(video);
        if let Some(audio) = audio {
            command.arg("-i").arg(audio);
        }
        command
            .arg("-c")
            .arg("copy")
            .arg("-y")
            .arg(output)
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let status = command.status().await?;
        if status.success() {
            Ok(())
        } else {
            Err(HarvestError::MuxFailed {
                code: status.code(),
            })
        }
    }
}

/// Best-effort removal of a temp file; absence is not an error.
pub async fn remove_temp(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove temp file {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_mux_success_with_stub() {
        let dir = tempdir().unwrap();
        let video = dir.path().join("v.m4s");
        tokio::fs::write(&video, b"x").await.unwrap();

        // `true` ignores its arguments and exits 0
        let muxer = Muxer::with_program("true");
        let result = muxer.mux(&video, None, &dir.path().join("out.mp4")).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_mux_failure_reports_exit_code() {
        let dir = tempdir().unwrap();
        let video = dir.path().join("v.m4s");
        tokio::fs::write(&video, b"x").await.unwrap();

        let muxer = Muxer::with_program("false");
        let result = muxer.mux(&video, None, &dir.path().join("out.mp4")).await;
        assert!(matches!(
            result,
            Err(HarvestError::MuxFailed { code: Some(1) })
        ));
    }

    #[tokio::test]
    async fn test_is_available_for_missing_binary() {
        let muxer = Muxer::with_program("definitely-not-a-real-muxer-binary");
        assert!(!muxer.is_available().await);
    }

    #[tokio::test]
    async fn test_remove_temp_tolerates_missing_file() {
        let dir = tempdir().unwrap();
        remove_temp(&dir.path().join("never-created.m4s")).await;
    }
}

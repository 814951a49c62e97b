//! Recording artifact ownership: chunk capture, finalize, upload bookkeeping
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::config::{UPLOAD_FILE_NAME, UPLOAD_MIME};
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where the current artifact sits in its life cycle. The terminal states are
/// Uploaded and Failed; there is no retry path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactStatus {
    Recording,
    Stopped,
    Uploading,
    Uploaded,
    Failed,
}

/// The in-memory recording of one session.
struct RecordingArtifact {
    chunks: Vec<Vec<u8>>,
    status: ArtifactStatus,
}

/// Everything the upload endpoint needs: the finalized blob plus the session
/// metadata sent alongside it as multipart fields.
#[derive(Debug)]
pub struct UploadRequest {
    pub video: Vec<u8>,
    pub file_name: &'static str,
    pub mime: &'static str,
    pub user_id: String,
    pub exercise: String,
    pub reps: u32,
}

/// Terminal result of an upload attempt, delivered back as an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UploadOutcome {
    Uploaded,
    Failed(String),
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("user id missing, refusing to upload")]
    MissingUserId,
    #[error("upload rejected with HTTP status {status}")]
    Rejected { status: u16 },
    #[error("upload transport failed: {0}")]
    Transport(String),
}

/// Owns the artifact for the session and enforces the once-only
/// stop-and-upload sequence. Chunks outside the recording window are counted
/// and dropped.
#[derive(Default)]
pub struct RecordingCoordinator {
    artifact: Option<RecordingArtifact>,
    dropped_chunks: u64,
    blob_bytes: usize,
}

impl RecordingCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the artifact. A second call within one session is a no-op.
    pub fn begin(&mut self) {
        if self.artifact.is_some() {
            warn!("recording already armed, ignoring duplicate start");
            return;
        }
        self.artifact = Some(RecordingArtifact {
            chunks: Vec::new(),
            status: ArtifactStatus::Recording,
        });
    }

    pub fn absorb_chunk(&mut self, data: Vec<u8>) {
        match self.artifact.as_mut() {
            Some(a) if a.status == ArtifactStatus::Recording => a.chunks.push(data),
            _ => {
                self.dropped_chunks += 1;
                debug!(
                    "chunk of {} bytes outside the recording window, dropped ({} so far)",
                    data.len(),
                    self.dropped_chunks
                );
            }
        }
    }

    /// Close the recording and hand back the concatenated blob. Returns None
    /// when there is nothing to finalize (never armed, or already finalized),
    /// which is what makes duplicate completion signals harmless.
    pub fn finalize(&mut self) -> Option<Vec<u8>> {
        let artifact = self.artifact.as_mut()?;
        if artifact.status != ArtifactStatus::Recording {
            return None;
        }
        artifact.status = ArtifactStatus::Stopped;
        let mut blob = Vec::new();
        for chunk in artifact.chunks.drain(..) {
            blob.extend_from_slice(&chunk);
        }
        self.blob_bytes = blob.len();
        Some(blob)
    }

    /// Build the multipart request for a finalized blob.
    pub fn upload_request(
        &mut self,
        video: Vec<u8>,
        user_id: &str,
        exercise: &str,
        reps: u32,
    ) -> Result<UploadRequest, UploadError> {
        if user_id.is_empty() {
            self.mark_failed("no user id configured");
            return Err(UploadError::MissingUserId);
        }
        self.mark_uploading();
        Ok(UploadRequest {
            video,
            file_name: UPLOAD_FILE_NAME,
            mime: UPLOAD_MIME,
            user_id: user_id.to_string(),
            exercise: exercise.to_string(),
            reps,
        })
    }

    fn mark_uploading(&mut self) {
        if let Some(a) = self.artifact.as_mut() {
            if a.status == ArtifactStatus::Stopped {
                a.status = ArtifactStatus::Uploading;
            }
        }
    }

    pub fn mark_failed(&mut self, reason: &str) {
        error!("recording upload failed: {}", reason);
        if let Some(a) = self.artifact.as_mut() {
            a.status = ArtifactStatus::Failed;
        }
    }

    /// Apply the upload outcome reported back by the uploader.
    pub fn settle(&mut self, outcome: &UploadOutcome) {
        match outcome {
            UploadOutcome::Uploaded => {
                if let Some(a) = self.artifact.as_mut() {
                    a.status = ArtifactStatus::Uploaded;
                }
            }
            UploadOutcome::Failed(reason) => self.mark_failed(reason),
        }
    }

    /// Discard the artifact without uploading (teardown mid-session).
    pub fn abort(&mut self) {
        if self.artifact.take().is_some() {
            debug!("recording discarded without upload");
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(
            self.artifact.as_ref().map(|a| a.status),
            Some(ArtifactStatus::Recording)
        )
    }

    /// True once nothing is pending: never armed, or reached a terminal state.
    pub fn is_settled(&self) -> bool {
        match self.artifact.as_ref() {
            None => true,
            Some(a) => matches!(a.status, ArtifactStatus::Uploaded | ArtifactStatus::Failed),
        }
    }

    pub fn status(&self) -> Option<ArtifactStatus> {
        self.artifact.as_ref().map(|a| a.status)
    }

    pub fn blob_bytes(&self) -> usize {
        self.blob_bytes
    }

    pub fn dropped_chunks(&self) -> u64 {
        self.dropped_chunks
    }
}

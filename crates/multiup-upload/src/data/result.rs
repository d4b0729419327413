use serde::Serialize;

use crate::error::{ErrorKind, UploadError};

/// Terminal value of one (file, host) upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadResult {
    pub file_name: String,
    pub host_id: String,
    pub attempts: u32,
    pub outcome: UploadOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadOutcome {
    Completed(UploadSuccess),
    Failed(UploadFailure),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadSuccess {
    pub download_url: String,
    pub host_file_id: Option<String>,
    pub bytes_uploaded: u64,
    pub elapsed_secs: f64,
    /// The host already had this file and no bytes were sent.
    pub deduplicated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<u16>,
    pub retries_exhausted: bool,
}

impl UploadFailure {
    pub fn from_error(error: &UploadError, retries_exhausted: bool) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            status: error.status(),
            retries_exhausted,
        }
    }
}

impl UploadResult {
    pub fn completed(
        file_name: impl Into<String>,
        host_id: impl Into<String>,
        attempts: u32,
        success: UploadSuccess,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            host_id: host_id.into(),
            attempts,
            outcome: UploadOutcome::Completed(success),
        }
    }

    pub fn failed(
        file_name: impl Into<String>,
        host_id: impl Into<String>,
        attempts: u32,
        failure: UploadFailure,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            host_id: host_id.into(),
            attempts,
            outcome: UploadOutcome::Failed(failure),
        }
    }

    pub fn cancelled(file_name: impl Into<String>, host_id: impl Into<String>, attempts: u32) -> Self {
        Self {
            file_name: file_name.into(),
            host_id: host_id.into(),
            attempts,
            outcome: UploadOutcome::Cancelled,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, UploadOutcome::Completed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, UploadOutcome::Cancelled)
    }

    pub fn download_url(&self) -> Option<&str> {
        match &self.outcome {
            UploadOutcome::Completed(s) => Some(&s.download_url),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&UploadFailure> {
        match &self.outcome {
            UploadOutcome::Failed(f) => Some(f),
            _ => None,
        }
    }
}

use std::fmt;
use std::sync::Arc;

use crate::data::result::UploadResult;

/// Bytes sent so far for one (file, host) attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub file_name: String,
    pub host_id: String,
    pub bytes_transferred: u64,
    pub total_bytes: u64,
}

/// A (file, host) pair reached its terminal result.
#[derive(Debug, Clone, PartialEq)]
pub struct FileCompleteEvent {
    pub result: UploadResult,
    /// Finished tasks so far, including resumed ones.
    pub completed: usize,
    pub total: usize,
}

pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;
pub type FileCompleteCallback = Arc<dyn Fn(&FileCompleteEvent) + Send + Sync>;

/// Caller hooks. Invoked from worker tasks, never from the caller's thread.
#[derive(Clone, Default)]
pub struct UploadCallbacks {
    pub on_progress: Option<ProgressCallback>,
    pub on_file_complete: Option<FileCompleteCallback>,
}

impl fmt::Debug for UploadCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadCallbacks")
            .field("on_progress", &self.on_progress.as_ref().map(|_| "<callback>"))
            .field(
                "on_file_complete",
                &self.on_file_complete.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl UploadCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_progress(mut self, f: impl Fn(&ProgressEvent) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_file_complete(mut self, f: impl Fn(&FileCompleteEvent) + Send + Sync + 'static) -> Self {
        self.on_file_complete = Some(Arc::new(f));
        self
    }

    pub(crate) fn file_complete(&self, event: &FileCompleteEvent) {
        if let Some(cb) = &self.on_file_complete {
            cb(event);
        }
    }
}

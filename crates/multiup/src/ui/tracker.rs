use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use indicatif::{ProgressBar, ProgressStyle};
use multiup_upload::{
    FileCompleteEvent, ProgressEvent, TransferProgress, UploadCallbacks, UploadOutcome,
};
use once_cell::sync::Lazy;

const PB_STYLE: &str = "{spinner:.blue} {msg:.cyan} [{elapsed_precise}] {wide_bar:.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

const TICK: &str = "⠁⠂⠄⡀⢀⠠⠐⠈ ";

const PB_CHARS: &str = "█▓▒░  ";

static PB_TEMPLATE: Lazy<Option<ProgressStyle>> = Lazy::new(|| {
    let pb_style = match ProgressStyle::with_template(PB_STYLE) {
        Ok(pb_style) => pb_style.tick_chars(TICK).progress_chars(PB_CHARS),
        Err(_) => return None,
    };

    Some(pb_style)
});

/// One byte bar for a whole gallery, fed by the engine's callbacks.
///
/// The bar's length is every file's size times the number of hosts. Retried
/// transfers restart from zero, so per-(host, file) totals are turned into
/// deltas and nothing is counted twice.
pub struct GalleryTracker {
    pb: ProgressBar,
    seen: Mutex<HashMap<(String, String), TransferProgress>>,
}

impl GalleryTracker {
    pub fn new(total_bytes: u64, msg: impl Into<String>) -> Arc<Self> {
        let pb = ProgressBar::new(total_bytes);
        let pb = if let Some(style) = PB_TEMPLATE.as_ref() {
            pb.with_style(style.clone())
        } else {
            pb
        };

        Arc::new(Self {
            pb: pb.with_message(msg.into()),
            seen: Mutex::new(HashMap::new()),
        })
    }

    pub fn callbacks(self: &Arc<Self>) -> UploadCallbacks {
        let progress = Arc::clone(self);
        let complete = Arc::clone(self);
        UploadCallbacks::new()
            .on_progress(move |event| progress.step(event))
            .on_file_complete(move |event| complete.file_done(event))
    }

    fn step(&self, event: &ProgressEvent) {
        let delta = self
            .seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((event.host_id.clone(), event.file_name.clone()))
            .or_default()
            .advance(event.bytes_transferred);
        self.pb.inc(delta);
    }

    fn file_done(&self, event: &FileCompleteEvent) {
        let result = &event.result;
        self.pb.set_message(format!("{}/{}", event.completed, event.total));
        let line = match &result.outcome {
            UploadOutcome::Completed(done) if done.deduplicated => {
                format!("= {} {} {} (already on host)", result.host_id, result.file_name, done.download_url)
            }
            UploadOutcome::Completed(done) => {
                format!("✓ {} {} {}", result.host_id, result.file_name, done.download_url)
            }
            UploadOutcome::Failed(failure) => {
                format!("✗ {} {} {}", result.host_id, result.file_name, failure.message)
            }
            UploadOutcome::Cancelled => format!("- {} {} cancelled", result.host_id, result.file_name),
        };
        self.pb.println(line);
    }

    pub fn finish(&self, msg: Option<String>) {
        if let Some(msg) = msg {
            self.pb.finish_with_message(msg);
        }
        self.pb.finish();
    }

    #[cfg(test)]
    fn position(&self) -> u64 {
        self.pb.position()
    }
}

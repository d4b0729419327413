use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::core::TransferProgress;
use crate::data::events::{ProgressCallback, ProgressEvent};
use crate::data::CancelFlag;
use crate::effects::bandwidth::BandwidthCounter;
use crate::error::TransportError;

/// Progress hook handed to the transport for one transfer.
///
/// Every report first checks the cancel flag, then feeds the byte delta into
/// the shared [`BandwidthCounter`] and, at most once per interval, calls the
/// caller's progress callback. The final total is always delivered.
#[derive(Clone)]
pub struct ProgressSink {
    inner: Arc<SinkInner>,
    callback: Option<ProgressCallback>,
    interval: Duration,
}

struct SinkInner {
    file_name: String,
    host_id: String,
    total_bytes: u64,
    bandwidth: Arc<BandwidthCounter>,
    cancel: CancelFlag,
    state: Mutex<SinkState>,
}

struct SinkState {
    progress: TransferProgress,
    last_emit: Option<Instant>,
}

impl std::fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSink")
            .field("file_name", &self.inner.file_name)
            .field("host_id", &self.inner.host_id)
            .field("total_bytes", &self.inner.total_bytes)
            .field("transferred", &self.transferred())
            .finish()
    }
}

impl ProgressSink {
    pub fn new(
        file_name: impl Into<String>,
        host_id: impl Into<String>,
        total_bytes: u64,
        bandwidth: Arc<BandwidthCounter>,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            inner: Arc::new(SinkInner {
                file_name: file_name.into(),
                host_id: host_id.into(),
                total_bytes,
                bandwidth,
                cancel,
                state: Mutex::new(SinkState {
                    progress: TransferProgress::new(),
                    last_emit: None,
                }),
            }),
            callback: None,
            interval: Duration::ZERO,
        }
    }

    /// Attach a caller callback, throttled to one call per `interval`.
    #[must_use]
    pub fn with_callback(mut self, callback: Option<ProgressCallback>, interval: Duration) -> Self {
        self.callback = callback;
        self.interval = interval;
        self
    }

    /// Report the cumulative bytes sent so far.
    ///
    /// # Errors
    ///
    /// Returns a cancelled [`TransportError`] once the cancel flag is set; the
    /// transport must abort the transfer when it sees it.
    pub fn report(&self, bytes_total: u64) -> Result<(), TransportError> {
        if self.inner.cancel.is_cancelled() {
            return Err(TransportError::cancelled());
        }

        let emit = {
            let mut state = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
            let delta = state.progress.advance(bytes_total);
            if delta > 0 {
                self.inner.bandwidth.add(delta);
            }

            let now = Instant::now();
            let due = state
                .last_emit
                .is_none_or(|last| now.duration_since(last) >= self.interval);
            let finished = bytes_total >= self.inner.total_bytes;
            if delta > 0 && (due || finished) {
                state.last_emit = Some(now);
                Some(state.progress.seen())
            } else {
                None
            }
        };

        if let (Some(seen), Some(cb)) = (emit, &self.callback) {
            cb(&ProgressEvent {
                file_name: self.inner.file_name.clone(),
                host_id: self.inner.host_id.clone(),
                bytes_transferred: seen,
                total_bytes: self.inner.total_bytes,
            });
        }
        Ok(())
    }

    pub fn transferred(&self) -> u64 {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .progress
            .seen()
    }

    pub fn total_bytes(&self) -> u64 {
        self.inner.total_bytes
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }
}

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

/// Gallery-scoped cooperative cancellation signal.
///
/// Workers poll [`CancelFlag::is_cancelled`] at their checkpoints; sleeps and
/// slot waits race against [`CancelFlag::cancelled`] instead.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once [`CancelFlag::cancel`] has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Lifecycle of one (file, host) upload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Authenticating,
    Initializing,
    Transferring,
    Polling,
    Completed,
    Cancelled,
    Failed,
}

impl TaskState {
    fn rank(self) -> u8 {
        match self {
            TaskState::Queued => 0,
            TaskState::Authenticating => 1,
            TaskState::Initializing => 2,
            TaskState::Transferring => 3,
            TaskState::Polling => 4,
            TaskState::Completed | TaskState::Cancelled | TaskState::Failed => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Cancelled | TaskState::Failed
        )
    }

    /// Whether moving from `self` to `next` keeps the state machine moving forward.
    pub fn can_advance_to(self, next: TaskState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            TaskState::Queued => false,
            TaskState::Cancelled => true,
            TaskState::Failed => self != TaskState::Queued,
            TaskState::Completed => matches!(self, TaskState::Transferring | TaskState::Polling),
            _ => next.rank() > self.rank(),
        }
    }
}

/// One file headed to one host.
#[derive(Debug, Clone)]
pub struct UploadTask {
    pub file_path: PathBuf,
    pub file_name: String,
    pub file_size: u64,
    pub host_id: String,
    pub attempt: u32,
    state: TaskState,
    bytes_transferred: u64,
    cancel: CancelFlag,
}

impl UploadTask {
    pub fn new(
        file_path: impl Into<PathBuf>,
        file_name: impl Into<String>,
        file_size: u64,
        host_id: impl Into<String>,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            file_name: file_name.into(),
            file_size,
            host_id: host_id.into(),
            attempt: 1,
            state: TaskState::Queued,
            bytes_transferred: 0,
            cancel,
        }
    }

    #[must_use]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Move to `next`. Backward moves are refused and leave the state unchanged.
    pub fn advance(&mut self, next: TaskState) -> bool {
        if self.state == next {
            return true;
        }
        if !self.state.can_advance_to(next) {
            tracing::debug!(
                file = %self.file_name,
                host = %self.host_id,
                from = ?self.state,
                to = ?next,
                "refusing backward task transition"
            );
            return false;
        }
        self.state = next;
        true
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    /// Record transfer progress for this attempt. Never decreases.
    pub fn record_transferred(&mut self, total: u64) {
        self.bytes_transferred = self.bytes_transferred.max(total);
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// A fresh attempt of the same (file, host) pair: next attempt number,
    /// back to `Queued`, byte counter reset.
    pub fn retry(self) -> Self {
        Self {
            attempt: self.attempt + 1,
            state: TaskState::Queued,
            bytes_transferred: 0,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> UploadTask {
        UploadTask::new("/g/a.jpg", "a.jpg", 10, "h", CancelFlag::new())
    }

    #[test]
    fn state_only_moves_forward() {
        let mut t = task();
        assert!(t.advance(TaskState::Authenticating));
        assert!(t.advance(TaskState::Transferring));
        assert!(!t.advance(TaskState::Initializing));
        assert_eq!(t.state(), TaskState::Transferring);
        assert!(t.advance(TaskState::Completed));
        assert!(!t.advance(TaskState::Failed));
        assert_eq!(t.state(), TaskState::Completed);
    }

    #[test]
    fn cancelled_is_reachable_from_any_live_state() {
        for state in [
            TaskState::Queued,
            TaskState::Authenticating,
            TaskState::Initializing,
            TaskState::Transferring,
            TaskState::Polling,
        ] {
            assert!(state.can_advance_to(TaskState::Cancelled), "{state:?}");
        }
        assert!(!TaskState::Queued.can_advance_to(TaskState::Failed));
    }

    #[test]
    fn retry_resets_progress_and_bumps_attempt() {
        let mut t = task();
        t.advance(TaskState::Authenticating);
        t.advance(TaskState::Transferring);
        t.record_transferred(7);
        t.record_transferred(3);
        assert_eq!(t.bytes_transferred(), 7);

        let t = t.retry();
        assert_eq!(t.attempt, 2);
        assert_eq!(t.bytes_transferred(), 0);
        assert_eq!(t.state(), TaskState::Queued);
    }

    #[tokio::test]
    async fn cancelled_future_resolves_after_cancel() {
        let flag = CancelFlag::new();
        let waiter = {
            let flag = flag.clone();
            tokio::spawn(async move { flag.cancelled().await })
        };
        tokio::task::yield_now().await;
        flag.cancel();
        waiter.await.unwrap();
        assert!(flag.is_cancelled());
    }
}

/// Turns cumulative byte totals into deltas.
///
/// Reporting the same total twice yields a zero delta, and a total lower
/// than one already seen is ignored, so nothing is ever counted twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferProgress {
    seen: u64,
}

impl TransferProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new cumulative total and return the bytes added since the last call.
    pub fn advance(&mut self, total: u64) -> u64 {
        let delta = total.saturating_sub(self.seen);
        self.seen = self.seen.max(total);
        delta
    }

    pub fn seen(&self) -> u64 {
        self.seen
    }
}

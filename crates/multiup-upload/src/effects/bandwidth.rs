use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

const RATE_WINDOW: Duration = Duration::from_secs(5);

/// Shared byte counter for every transfer of one engine.
///
/// Additions are a single atomic `fetch_add`, so N concurrent writers adding
/// M bytes each always total N×M. A short sample window backs the live rate.
#[derive(Debug)]
pub struct BandwidthCounter {
    total: AtomicU64,
    samples: Mutex<VecDeque<(Instant, u64)>>,
    window: Duration,
}

/// Point-in-time reading, used to measure bytes over a span such as one gallery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandwidthSnapshot {
    pub total: u64,
    pub at: Instant,
}

impl Default for BandwidthCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl BandwidthCounter {
    pub fn new() -> Self {
        Self::with_window(RATE_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            total: AtomicU64::new(0),
            samples: Mutex::new(VecDeque::new()),
            window,
        }
    }

    pub fn add(&self, bytes: u64) {
        if bytes == 0 {
            return;
        }
        self.total.fetch_add(bytes, Ordering::Relaxed);

        let now = Instant::now();
        let mut samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        samples.push_back((now, bytes));
        Self::prune(&mut samples, now, self.window);
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> BandwidthSnapshot {
        BandwidthSnapshot {
            total: self.total(),
            at: Instant::now(),
        }
    }

    /// Bytes added since `snapshot` was taken.
    pub fn since(&self, snapshot: &BandwidthSnapshot) -> u64 {
        self.total().saturating_sub(snapshot.total)
    }

    /// Bytes per second over the recent sample window.
    pub fn rate_bps(&self) -> f64 {
        let now = Instant::now();
        let mut samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        Self::prune(&mut samples, now, self.window);

        let Some((oldest, _)) = samples.front() else {
            return 0.0;
        };
        let bytes: u64 = samples.iter().map(|(_, b)| b).sum();
        let span = now.duration_since(*oldest).max(Duration::from_millis(100));
        bytes as f64 / span.as_secs_f64()
    }

    fn prune(samples: &mut VecDeque<(Instant, u64)>, now: Instant, window: Duration) {
        while let Some((at, _)) = samples.front() {
            if now.duration_since(*at) > window {
                samples.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn concurrent_adds_are_not_lost() {
        const THREADS: u64 = 16;
        const ADDS: u64 = 1_000;
        const BYTES: u64 = 7;

        let counter = Arc::new(BandwidthCounter::new());
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || {
                    for _ in 0..ADDS {
                        counter.add(BYTES);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.total(), THREADS * ADDS * BYTES);
    }

    #[test]
    fn snapshot_measures_a_span() {
        let counter = BandwidthCounter::new();
        counter.add(100);
        let snap = counter.snapshot();
        counter.add(40);
        counter.add(2);
        assert_eq!(counter.since(&snap), 42);
    }

    #[test]
    fn rate_is_zero_without_samples() {
        let counter = BandwidthCounter::new();
        assert_eq!(counter.rate_bps(), 0.0);
        counter.add(1_000);
        assert!(counter.rate_bps() > 0.0);
    }
}

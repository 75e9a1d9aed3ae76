use std::collections::VecDeque;
use std::time::{Duration, Instant};

use cloudpart_protocol::UploadProgress;

/// Span of recent samples the reported rate is averaged over.
const RATE_WINDOW: Duration = Duration::from_secs(5);

/// Cumulative byte counter for one upload.
///
/// The confirmed byte count only grows and never exceeds the total, so
/// every snapshot it hands out is at least as far along as the previous one.
/// Owned by a single task; no internal locking.
pub struct ProgressCounter {
    total_bytes: u64,
    uploaded_bytes: u64,
    rate: RateWindow,
}

impl ProgressCounter {
    /// Creates a counter for `total_bytes` with nothing uploaded.
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            uploaded_bytes: 0,
            rate: RateWindow::new(RATE_WINDOW),
        }
    }

    /// Records `bytes` confirmed by the backend and returns the new snapshot.
    pub fn advance(&mut self, bytes: u64) -> UploadProgress {
        let before = self.uploaded_bytes;
        self.uploaded_bytes = self
            .uploaded_bytes
            .saturating_add(bytes)
            .min(self.total_bytes);
        self.rate.record(Instant::now(), self.uploaded_bytes - before);
        self.snapshot()
    }

    /// Returns the current progress.
    pub fn snapshot(&self) -> UploadProgress {
        UploadProgress {
            total_bytes: self.total_bytes,
            uploaded_bytes: self.uploaded_bytes,
            bytes_per_second: self.rate.bytes_per_second(),
        }
    }

    /// Bytes confirmed so far.
    pub fn uploaded_bytes(&self) -> u64 {
        self.uploaded_bytes
    }

    /// Total bytes to transfer.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}

/// Transfer rate over a sliding time window.
struct RateWindow {
    window: Duration,
    samples: VecDeque<(Instant, u64)>,
}

impl RateWindow {
    fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
        }
    }

    fn record(&mut self, at: Instant, bytes: u64) {
        self.samples.push_back((at, bytes));
        if let Some(cutoff) = at.checked_sub(self.window) {
            while self.samples.front().is_some_and(|(t, _)| *t < cutoff) {
                self.samples.pop_front();
            }
        }
    }

    /// Average rate between the oldest and newest sample; 0 with fewer
    /// than two samples.
    fn bytes_per_second(&self) -> f64 {
        let (Some((first, _)), Some((last, _))) = (self.samples.front(), self.samples.back())
        else {
            return 0.0;
        };
        let elapsed = last.duration_since(*first);
        if elapsed.is_zero() {
            return 0.0;
        }
        // The first sample opens the window; its bytes predate it.
        let bytes: u64 = self.samples.iter().skip(1).map(|(_, b)| b).sum();
        bytes as f64 / elapsed.as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_starts_empty() {
        let counter = ProgressCounter::new(100);
        let p = counter.snapshot();
        assert_eq!(p.total_bytes, 100);
        assert_eq!(p.uploaded_bytes, 0);
        assert_eq!(p.bytes_per_second, 0.0);
    }

    #[test]
    fn counter_accumulates() {
        let mut counter = ProgressCounter::new(100);
        assert_eq!(counter.advance(30).uploaded_bytes, 30);
        assert_eq!(counter.advance(20).uploaded_bytes, 50);
        assert_eq!(counter.uploaded_bytes(), 50);
        assert_eq!(counter.total_bytes(), 100);
    }

    #[test]
    fn counter_is_capped_at_total() {
        let mut counter = ProgressCounter::new(100);
        counter.advance(90);
        let p = counter.advance(50);
        assert_eq!(p.uploaded_bytes, 100);
        assert!(p.is_complete());
    }

    #[test]
    fn counter_never_regresses() {
        let mut counter = ProgressCounter::new(1_000);
        let mut last = 0;
        for bytes in [0, 10, 0, 250, 1, 999, 0] {
            let p = counter.advance(bytes);
            assert!(p.uploaded_bytes >= last);
            last = p.uploaded_bytes;
        }
        assert_eq!(last, 1_000);
    }

    #[test]
    fn rate_needs_two_samples() {
        let mut rate = RateWindow::new(Duration::from_secs(5));
        assert_eq!(rate.bytes_per_second(), 0.0);
        rate.record(Instant::now(), 100);
        assert_eq!(rate.bytes_per_second(), 0.0);
    }

    #[test]
    fn rate_over_elapsed_time() {
        let start = Instant::now();
        let mut rate = RateWindow::new(Duration::from_secs(5));
        rate.record(start, 500);
        rate.record(start + Duration::from_secs(1), 1_000);
        rate.record(start + Duration::from_secs(2), 1_000);
        assert_eq!(rate.bytes_per_second(), 1_000.0);
    }

    #[test]
    fn rate_drops_samples_outside_window() {
        let start = Instant::now();
        let mut rate = RateWindow::new(Duration::from_secs(5));
        rate.record(start, 1_000_000);
        rate.record(start + Duration::from_secs(10), 100);
        rate.record(start + Duration::from_secs(11), 100);
        assert_eq!(rate.samples.len(), 2);
        assert_eq!(rate.bytes_per_second(), 100.0);
    }
}

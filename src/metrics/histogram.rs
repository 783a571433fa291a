//! Lock-free latency histogram with fixed Prometheus buckets.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Upper bounds of the histogram buckets in microseconds.
/// Spans an in-memory increment (10μs) up to an fsynced RocksDB write (50ms).
pub const HISTOGRAM_BUCKETS: [u64; 12] = [
    10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 25_000, 50_000,
];

const BUCKET_COUNT: usize = HISTOGRAM_BUCKETS.len();

/// Point-in-time copy of a [`Histogram`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistogramSnapshot {
    pub sum: u64,
    pub count: u64,
    /// Cumulative counts, one per entry of [`HISTOGRAM_BUCKETS`].
    pub buckets: [u64; BUCKET_COUNT],
}

impl HistogramSnapshot {
    /// Mean observation, or 0 when empty.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64
        }
    }
}

/// Thread-safe histogram for latency distributions.
///
/// ```
/// use seqd::metrics::Histogram;
///
/// let histogram = Histogram::new();
/// histogram.observe(150);
///
/// let snapshot = histogram.snapshot();
/// assert_eq!(snapshot.count, 1);
/// assert_eq!(snapshot.sum, 150);
/// ```
pub struct Histogram {
    sum: AtomicU64,
    count: AtomicU64,
    buckets: [AtomicU64; BUCKET_COUNT],
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    pub fn new() -> Self {
        Self {
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Records an observation in microseconds.
    #[inline]
    pub fn observe(&self, value_us: u64) {
        self.sum.fetch_add(value_us, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        // Cumulative: every bucket whose bound covers the value
        for (bucket, &bound) in self.buckets.iter().zip(HISTOGRAM_BUCKETS.iter()) {
            if value_us <= bound {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Records the time elapsed since `start`.
    #[inline]
    pub fn observe_since(&self, start: Instant) -> u64 {
        let elapsed_us = start.elapsed().as_micros() as u64;
        self.observe(elapsed_us);
        elapsed_us
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            sum: self.sum.load(Ordering::Relaxed),
            count: self.count.load(Ordering::Relaxed),
            buckets: std::array::from_fn(|i| self.buckets[i].load(Ordering::Relaxed)),
        }
    }

    /// Writes the histogram in Prometheus exposition format.
    ///
    /// `labels` is inserted verbatim inside the braces, e.g. `op="next"`.
    /// HELP and TYPE lines are the caller's job so several label sets can
    /// share one metric family.
    pub fn write_prometheus(&self, output: &mut String, name: &str, labels: &str) {
        let snapshot = self.snapshot();
        let sep = if labels.is_empty() { "" } else { "," };

        for (bound, count) in HISTOGRAM_BUCKETS.iter().zip(snapshot.buckets.iter()) {
            let _ = writeln!(
                output,
                "{}_bucket{{{}{}le=\"{}\"}} {}",
                name, labels, sep, bound, count
            );
        }
        let _ = writeln!(
            output,
            "{}_bucket{{{}{}le=\"+Inf\"}} {}",
            name, labels, sep, snapshot.count
        );
        if labels.is_empty() {
            let _ = writeln!(output, "{}_sum {}", name, snapshot.sum);
            let _ = writeln!(output, "{}_count {}", name, snapshot.count);
        } else {
            let _ = writeln!(output, "{}_sum{{{}}} {}", name, labels, snapshot.sum);
            let _ = writeln!(output, "{}_count{{{}}} {}", name, labels, snapshot.count);
        }
    }
}

//! Observability metrics for seqd.
//!
//! All hot-path recording uses relaxed atomics; formatting happens on scrape.

pub mod histogram;
pub mod registry;

pub use histogram::{Histogram, HistogramSnapshot, HISTOGRAM_BUCKETS};
pub use registry::{ApiMetrics, MetricsRegistry, SequenceMetrics};

//! Metrics registry for sequence traffic.
//!
//! Per-sequence counters live in concurrent hashmaps keyed by sequence name;
//! everything else is a plain atomic.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use super::Histogram;

/// Central registry for seqd metrics.
#[derive(Default)]
pub struct MetricsRegistry {
    /// Per-sequence increment metrics
    pub sequences: Arc<SequenceMetrics>,
    /// Request latency and error metrics
    pub api: Arc<ApiMetrics>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Formats all metrics in Prometheus exposition format.
    pub fn format_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);
        output.push_str(&self.sequences.format_prometheus());
        output.push_str(&self.api.format_prometheus());
        output
    }
}

/// Metrics tracked per sequence name.
#[derive(Default)]
pub struct SequenceMetrics {
    /// Successful increments per sequence
    increments: DashMap<String, AtomicU64>,
    /// Last value handed out or set per sequence
    last_values: DashMap<String, AtomicU64>,
}

impl SequenceMetrics {
    /// Records a successful `next_value`.
    pub fn record_increment(&self, name: &str, value: u64) {
        bump(&self.increments, name, 1);
        self.record_value(name, value);
    }

    /// Records a value a sequence has reached. The gauge only moves forward.
    pub fn record_value(&self, name: &str, value: u64) {
        if let Some(last) = self.last_values.get(name) {
            last.fetch_max(value, Ordering::Relaxed);
            return;
        }
        self.last_values
            .entry(name.to_string())
            .or_default()
            .fetch_max(value, Ordering::Relaxed);
    }

    /// Records an explicit `set_value`, which may lower the counter.
    pub fn record_set(&self, name: &str, value: u64) {
        if let Some(last) = self.last_values.get(name) {
            last.store(value, Ordering::Relaxed);
            return;
        }
        self.last_values
            .entry(name.to_string())
            .or_default()
            .store(value, Ordering::Relaxed);
    }

    pub fn increments(&self, name: &str) -> u64 {
        self.increments
            .get(name)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn last_value(&self, name: &str) -> Option<u64> {
        self.last_values
            .get(name)
            .map(|v| v.load(Ordering::Relaxed))
    }

    pub fn format_prometheus(&self) -> String {
        let mut output = String::with_capacity(1024);

        let _ = writeln!(
            output,
            "# HELP seqd_sequence_increments_total Successful increments per sequence"
        );
        let _ = writeln!(output, "# TYPE seqd_sequence_increments_total counter");
        for entry in sorted(&self.increments) {
            let _ = writeln!(
                output,
                "seqd_sequence_increments_total{{sequence=\"{}\"}} {}",
                escape_label(&entry.0),
                entry.1
            );
        }
        output.push('\n');

        let _ = writeln!(
            output,
            "# HELP seqd_sequence_value Last value observed per sequence"
        );
        let _ = writeln!(output, "# TYPE seqd_sequence_value gauge");
        for entry in sorted(&self.last_values) {
            let _ = writeln!(
                output,
                "seqd_sequence_value{{sequence=\"{}\"}} {}",
                escape_label(&entry.0),
                entry.1
            );
        }
        output.push('\n');

        output
    }
}

/// Request metrics with latency histograms per operation.
#[derive(Default)]
pub struct ApiMetrics {
    pub next_latency_us: Histogram,
    pub read_latency_us: Histogram,
    pub set_latency_us: Histogram,
    pub create_latency_us: Histogram,
    /// Errors per response code (e.g. `SEQUENCE_NOT_FOUND`)
    errors_by_code: DashMap<String, AtomicU64>,
}

impl ApiMetrics {
    pub fn record_error(&self, code: &str) {
        bump(&self.errors_by_code, code, 1);
    }

    pub fn errors(&self, code: &str) -> u64 {
        self.errors_by_code
            .get(code)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn format_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);

        let _ = writeln!(
            output,
            "# HELP seqd_request_latency_us Request latency in microseconds by operation"
        );
        let _ = writeln!(output, "# TYPE seqd_request_latency_us histogram");
        for (op, histogram) in [
            ("next", &self.next_latency_us),
            ("read", &self.read_latency_us),
            ("set", &self.set_latency_us),
            ("create", &self.create_latency_us),
        ] {
            histogram.write_prometheus(
                &mut output,
                "seqd_request_latency_us",
                &format!("op=\"{}\"", op),
            );
        }
        output.push('\n');

        let _ = writeln!(
            output,
            "# HELP seqd_errors_by_code_total Failed requests by error code"
        );
        let _ = writeln!(output, "# TYPE seqd_errors_by_code_total counter");
        for (code, count) in sorted(&self.errors_by_code) {
            let _ = writeln!(
                output,
                "seqd_errors_by_code_total{{code=\"{}\"}} {}",
                code, count
            );
        }
        output.push('\n');

        output
    }
}

fn bump(map: &DashMap<String, AtomicU64>, key: &str, by: u64) {
    // Fast path: existing key needs only a shard read lock
    if let Some(counter) = map.get(key) {
        counter.fetch_add(by, Ordering::Relaxed);
        return;
    }
    map.entry(key.to_string())
        .or_default()
        .fetch_add(by, Ordering::Relaxed);
}

/// Stable output order for scrapes and tests.
fn sorted(map: &DashMap<String, AtomicU64>) -> Vec<(String, u64)> {
    let mut entries: Vec<_> = map
        .iter()
        .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
        .collect();
    entries.sort();
    entries
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_are_counted_per_sequence() {
        let metrics = SequenceMetrics::default();
        metrics.record_increment("orders", 1);
        metrics.record_increment("orders", 2);
        metrics.record_increment("users", 41);

        assert_eq!(metrics.increments("orders"), 2);
        assert_eq!(metrics.increments("users"), 1);
        assert_eq!(metrics.increments("missing"), 0);
        assert_eq!(metrics.last_value("orders"), Some(2));
        assert_eq!(metrics.last_value("users"), Some(41));
    }

    #[test]
    fn set_updates_last_value_without_counting() {
        let metrics = SequenceMetrics::default();
        metrics.record_set("orders", 666);
        assert_eq!(metrics.increments("orders"), 0);
        assert_eq!(metrics.last_value("orders"), Some(666));

        metrics.record_set("orders", 3);
        assert_eq!(metrics.last_value("orders"), Some(3));
    }

    #[test]
    fn last_value_does_not_regress_on_late_reports() {
        let metrics = SequenceMetrics::default();
        metrics.record_increment("orders", 5);
        metrics.record_increment("orders", 4);
        metrics.record_value("orders", 2);

        assert_eq!(metrics.increments("orders"), 2);
        assert_eq!(metrics.last_value("orders"), Some(5));
    }

    #[test]
    fn sequence_metrics_prometheus_format() {
        let metrics = SequenceMetrics::default();
        metrics.record_increment("b", 3);
        metrics.record_increment("a\"q", 9);

        let output = metrics.format_prometheus();
        assert!(output.contains("# TYPE seqd_sequence_increments_total counter"));
        assert!(output.contains("seqd_sequence_increments_total{sequence=\"b\"} 1"));
        assert!(output.contains("seqd_sequence_value{sequence=\"a\\\"q\"} 9"));

        // Sorted by name
        let a = output.find("sequence=\"a").unwrap();
        let b = output.find("sequence=\"b\"").unwrap();
        assert!(a < b);
    }

    #[test]
    fn api_errors_by_code() {
        let api = ApiMetrics::default();
        api.record_error("SEQUENCE_NOT_FOUND");
        api.record_error("SEQUENCE_NOT_FOUND");
        api.record_error("INVALID_INPUT");

        assert_eq!(api.errors("SEQUENCE_NOT_FOUND"), 2);
        let output = api.format_prometheus();
        assert!(output.contains("seqd_errors_by_code_total{code=\"INVALID_INPUT\"} 1"));
        assert!(output.contains("seqd_request_latency_us_count{op=\"next\"} 0"));
    }

    #[test]
    fn registry_combines_sections() {
        let registry = MetricsRegistry::new();
        registry.sequences.record_increment("orders", 1);
        registry.api.next_latency_us.observe(20);

        let output = registry.format_prometheus();
        assert!(output.contains("seqd_sequence_increments_total"));
        assert!(output.contains("seqd_request_latency_us_sum{op=\"next\"} 20"));
    }
}

//! Batch collection and aggregation of metric records
//!
//! Provides:
//! - Timestamped accumulation of records from any number of threads
//! - Global and per-operation duration statistics
//! - Nearest-rank percentiles (p50, p75, p90, p95, p99)

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::memory::round_to;
use crate::record::MetricRecord;

/// Nearest-rank percentile of an ascending slice.
///
/// `index = ceil(p / 100 * n) - 1`, clamped to `[0, n - 1]`. Returns 0.0 for
/// an empty slice.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let n = sorted.len();
    let rank = (p / 100.0 * n as f64).ceil() as i64 - 1;
    let index = rank.clamp(0, n as i64 - 1) as usize;
    sorted[index]
}

/// Percentile set reported for every group of durations
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl Percentiles {
    /// Compute from unsorted durations
    pub fn from_durations(durations: &[f64]) -> Self {
        let mut sorted = durations.to_vec();
        sorted.sort_by(f64::total_cmp);
        Self {
            p50: percentile(&sorted, 50.0),
            p75: percentile(&sorted, 75.0),
            p90: percentile(&sorted, 90.0),
            p95: percentile(&sorted, 95.0),
            p99: percentile(&sorted, 99.0),
        }
    }
}

/// Statistics for one operation name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationStats {
    pub count: usize,
    pub total_duration: f64,
    pub avg_duration: f64,
    pub min_duration: f64,
    pub max_duration: f64,
    /// Average current memory in MB, rounded to 2 decimals
    pub avg_memory_mb: f64,
    pub percentiles: Percentiles,
}

/// Aggregate over everything in a collector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total_operations: usize,
    pub total_duration: f64,
    pub avg_duration: f64,
    /// Sum of current memory in MB, rounded to 2 decimals
    pub total_memory_mb: f64,
    pub percentiles: Percentiles,
    /// Per-name statistics, in order of first appearance
    pub by_operation: IndexMap<String, OperationStats>,
}

/// One collected record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedMetric {
    pub name: String,
    pub recorded_at: DateTime<Utc>,
    pub record: MetricRecord,
}

/// Thread-safe accumulator of metric records
#[derive(Debug, Default)]
pub struct MetricsCollector {
    entries: Mutex<Vec<CollectedMetric>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record under `name`
    pub fn record(&self, name: impl Into<String>, record: MetricRecord) {
        let name = name.into();
        debug!(operation = %name, total = record.total, "metric collected");
        self.entries.lock().push(CollectedMetric {
            name,
            recorded_at: Utc::now(),
            record,
        });
    }

    /// Number of collected records
    pub fn count(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop all collected records
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Records collected under `name`, in insertion order
    pub fn by_operation(&self, name: &str) -> Vec<CollectedMetric> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.name == name)
            .cloned()
            .collect()
    }

    /// Copy of everything collected so far
    pub fn entries(&self) -> Vec<CollectedMetric> {
        self.entries.lock().clone()
    }

    /// Compute global and per-operation statistics
    pub fn aggregate(&self) -> AggregateStats {
        let entries = self.entries.lock();
        if entries.is_empty() {
            return AggregateStats::default();
        }

        let mut durations = Vec::with_capacity(entries.len());
        let mut total_memory_mb = 0.0;
        let mut groups: IndexMap<&str, (Vec<f64>, f64)> = IndexMap::new();

        for entry in entries.iter() {
            let duration = entry.record.total;
            let memory_mb = entry.record.current_memory_mb();

            durations.push(duration);
            total_memory_mb += memory_mb;

            let group = groups.entry(entry.name.as_str()).or_default();
            group.0.push(duration);
            group.1 += memory_mb;
        }

        let total_duration: f64 = durations.iter().sum();
        let by_operation = groups
            .into_iter()
            .map(|(name, (durations, memory_mb))| {
                (name.to_string(), operation_stats(&durations, memory_mb))
            })
            .collect();

        AggregateStats {
            total_operations: durations.len(),
            total_duration,
            avg_duration: total_duration / durations.len() as f64,
            total_memory_mb: round_to(total_memory_mb, 2),
            percentiles: Percentiles::from_durations(&durations),
            by_operation,
        }
    }
}

fn operation_stats(durations: &[f64], memory_mb: f64) -> OperationStats {
    let count = durations.len();
    let total: f64 = durations.iter().sum();
    let min = durations.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = durations.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    OperationStats {
        count,
        total_duration: total,
        avg_duration: total / count as f64,
        min_duration: min,
        max_duration: max,
        avg_memory_mb: round_to(memory_mb / count as f64, 2),
        percentiles: Percentiles::from_durations(durations),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MemoryStats;
    use std::sync::Arc;
    use std::thread;

    fn rec(name: &str, total: f64) -> MetricRecord {
        MetricRecord::new(name, total)
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let sorted = [0.1, 0.2, 0.5];
        assert_eq!(percentile(&sorted, 50.0), 0.2);
        assert_eq!(percentile(&sorted, 75.0), 0.5);
        assert_eq!(percentile(&sorted, 0.0), 0.1);
        assert_eq!(percentile(&sorted, 100.0), 0.5);
        assert_eq!(percentile(&[], 50.0), 0.0);
        assert_eq!(percentile(&[7.0], 99.0), 7.0);
    }

    #[test]
    fn test_percentiles_sort_input() {
        let p = Percentiles::from_durations(&[0.5, 0.1, 0.2]);
        assert_eq!(p.p50, 0.2);
        assert_eq!(p.p99, 0.5);
    }

    #[test]
    fn test_percentiles_ten_values() {
        let durations: Vec<f64> = (1..=10).map(|i| i as f64).collect();
        let p = Percentiles::from_durations(&durations);
        // ceil(0.5*10)-1 = 4, ceil(0.75*10)-1 = 7, ceil(0.9*10)-1 = 8, ceil(0.95*10)-1 = 9
        assert_eq!(p.p50, 5.0);
        assert_eq!(p.p75, 8.0);
        assert_eq!(p.p90, 9.0);
        assert_eq!(p.p95, 10.0);
        assert_eq!(p.p99, 10.0);
    }

    #[test]
    fn test_empty_aggregate() {
        let collector = MetricsCollector::new();
        let stats = collector.aggregate();

        assert_eq!(stats.total_operations, 0);
        assert_eq!(stats.total_duration, 0.0);
        assert_eq!(stats.avg_duration, 0.0);
        assert_eq!(stats.total_memory_mb, 0.0);
        assert_eq!(stats.percentiles, Percentiles::default());
        assert!(stats.by_operation.is_empty());

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["percentiles"]["p95"], 0.0);
        assert!(json["by_operation"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_aggregate_by_operation() {
        let collector = MetricsCollector::new();
        collector.record("query", rec("query", 0.5));
        collector.record("render", rec("render", 2.0));
        collector.record("query", rec("query", 0.1));
        collector.record("query", rec("query", 0.2));

        let stats = collector.aggregate();
        assert_eq!(stats.total_operations, 4);
        assert!((stats.total_duration - 2.8).abs() < 1e-12);
        assert!((stats.avg_duration - 0.7).abs() < 1e-12);

        let names: Vec<_> = stats.by_operation.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["query", "render"]);

        let query = &stats.by_operation["query"];
        assert_eq!(query.count, 3);
        assert!((query.total_duration - 0.8).abs() < 1e-12);
        assert_eq!(query.min_duration, 0.1);
        assert_eq!(query.max_duration, 0.5);
        assert_eq!(query.percentiles.p50, 0.2);
        assert_eq!(query.avg_memory_mb, 0.0);

        let render = &stats.by_operation["render"];
        assert_eq!(render.count, 1);
        assert_eq!(render.percentiles.p99, 2.0);
    }

    #[test]
    fn test_aggregate_memory() {
        let collector = MetricsCollector::new();
        collector.record(
            "op",
            rec("op", 1.0).with_memory(MemoryStats::new(1_048_576, 1_048_576, 0)),
        );
        collector.record(
            "op",
            rec("op", 1.0).with_memory(MemoryStats::new(2_097_152, 2_097_152, 0)),
        );
        collector.record("op", rec("op", 1.0));

        let stats = collector.aggregate();
        assert_eq!(stats.total_memory_mb, 3.0);
        assert_eq!(stats.by_operation["op"].avg_memory_mb, 1.0);
    }

    #[test]
    fn test_deserialized_negative_total_does_not_skew_aggregate() {
        let collector = MetricsCollector::new();
        let record = MetricRecord::from_json(r#"{"operation":"op","total":-5.0}"#).unwrap();
        collector.record("op", record);
        collector.record("op", rec("op", 1.0));

        let stats = collector.aggregate();
        assert_eq!(stats.total_duration, 1.0);
        assert_eq!(stats.by_operation["op"].min_duration, 0.0);
    }

    #[test]
    fn test_by_operation_and_clear() {
        let collector = MetricsCollector::new();
        collector.record("a", rec("a", 0.3));
        collector.record("b", rec("b", 0.1));
        collector.record("a", rec("a", 0.2));

        let a = collector.by_operation("a");
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].record.total, 0.3);
        assert_eq!(a[1].record.total, 0.2);
        assert!(collector.by_operation("missing").is_empty());

        assert_eq!(collector.count(), 3);
        collector.clear();
        assert_eq!(collector.count(), 0);
        assert!(collector.is_empty());
    }

    #[test]
    fn test_concurrent_recording() {
        let collector = Arc::new(MetricsCollector::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let collector = collector.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        collector.record(format!("worker-{}", i % 2), rec("w", 0.01));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = collector.aggregate();
        assert_eq!(stats.total_operations, 800);
        assert_eq!(stats.by_operation.len(), 2);
        assert_eq!(stats.by_operation.values().map(|s| s.count).sum::<usize>(), 800);
    }
}

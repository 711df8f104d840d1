//! Before/after comparison of two metric records
//!
//! Used to verify an optimization: each axis (duration, memory, phases,
//! counters) is diffed and the overall result is classified as regressed,
//! improved or unchanged based on the duration axis.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{MetricsError, Result};
use crate::memory::{bytes_to_mb, round_to};
use crate::record::MetricRecord;

/// Default regression threshold (10% slower)
pub const DEFAULT_REGRESSION_THRESHOLD: f64 = 0.1;

/// Memory change above this percentage gets a summary message
const MEMORY_MESSAGE_PERCENT: f64 = 10.0;

/// Phase change above this percentage counts as significant
const SIGNIFICANT_PHASE_PERCENT: f64 = 20.0;

/// Overall classification of a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonStatus {
    Regressed,
    Improved,
    Unchanged,
}

impl fmt::Display for ComparisonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonStatus::Regressed => write!(f, "regressed"),
            ComparisonStatus::Improved => write!(f, "improved"),
            ComparisonStatus::Unchanged => write!(f, "unchanged"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationChange {
    pub before: f64,
    pub after: f64,
    pub absolute_change: f64,
    /// Percent change rounded to 2 decimals
    pub percentage_change: f64,
    pub improved: bool,
    pub regressed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryChange {
    pub before_mb: f64,
    pub after_mb: f64,
    pub absolute_change_mb: f64,
    pub percentage_change: f64,
    pub improved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseChange {
    pub before: f64,
    pub after: f64,
    pub absolute_change: f64,
    pub percentage_change: f64,
    pub improved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountChange {
    pub before: i64,
    pub after: i64,
    pub change: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub status: ComparisonStatus,
    pub messages: Vec<String>,
    /// Duration percent change
    pub overall_change_percent: f64,
}

/// Field-by-field diff of two records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub duration: DurationChange,
    pub memory: MemoryChange,
    pub phases: IndexMap<String, PhaseChange>,
    pub counts: IndexMap<String, CountChange>,
    pub summary: ComparisonSummary,
}

impl ComparisonResult {
    pub fn is_regression(&self) -> bool {
        self.summary.status == ComparisonStatus::Regressed
    }

    /// Export to JSON
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Compares before/after records
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsComparator {
    regression_threshold: f64,
}

impl Default for MetricsComparator {
    fn default() -> Self {
        Self {
            regression_threshold: DEFAULT_REGRESSION_THRESHOLD,
        }
    }
}

/// `(absolute, percentage)` where percentage is 0 when `before` is not positive
fn change(before: f64, after: f64) -> (f64, f64) {
    let absolute = after - before;
    let percentage = if before > 0.0 {
        absolute / before * 100.0
    } else {
        0.0
    };
    (absolute, percentage)
}

impl MetricsComparator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the regression threshold as a fraction (0.1 = 10% slower)
    pub fn regression_threshold(mut self, fraction: f64) -> Result<Self> {
        if !fraction.is_finite() || fraction < 0.0 {
            return Err(MetricsError::Configuration(format!(
                "regression threshold must be a non-negative fraction, got {}",
                fraction
            )));
        }
        self.regression_threshold = fraction;
        Ok(self)
    }

    pub fn threshold(&self) -> f64 {
        self.regression_threshold
    }

    /// Diff `after` against `before`
    pub fn compare(&self, before: &MetricRecord, after: &MetricRecord) -> ComparisonResult {
        let duration = self.compare_duration(before, after);
        let memory = compare_memory(before, after);
        let phases = compare_phases(before, after);
        let counts = compare_counts(before, after);
        let summary = self.summarize(&duration, &memory, &phases);

        ComparisonResult {
            duration,
            memory,
            phases,
            counts,
            summary,
        }
    }

    fn compare_duration(&self, before: &MetricRecord, after: &MetricRecord) -> DurationChange {
        let (absolute, percentage) = change(before.total, after.total);
        DurationChange {
            before: before.total,
            after: after.total,
            absolute_change: absolute,
            percentage_change: round_to(percentage, 2),
            improved: absolute < 0.0,
            regressed: percentage > self.regression_threshold * 100.0,
        }
    }

    fn summarize(
        &self,
        duration: &DurationChange,
        memory: &MemoryChange,
        phases: &IndexMap<String, PhaseChange>,
    ) -> ComparisonSummary {
        let mut messages = Vec::new();
        let (_, percentage) = change(duration.before, duration.after);

        let status = if duration.regressed {
            messages.push(format!(
                "Performance regressed by {:.1}% ({:.2}s -> {:.2}s)",
                percentage, duration.before, duration.after
            ));
            ComparisonStatus::Regressed
        } else if duration.improved {
            messages.push(format!(
                "Performance improved by {:.1}% ({:.2}s -> {:.2}s)",
                percentage.abs(),
                duration.before,
                duration.after
            ));
            ComparisonStatus::Improved
        } else {
            ComparisonStatus::Unchanged
        };

        if memory.percentage_change.abs() > MEMORY_MESSAGE_PERCENT {
            let direction = if memory.absolute_change_mb < 0.0 {
                "decreased"
            } else {
                "increased"
            };
            messages.push(format!(
                "Memory usage {} by {:.1}MB ({:.1}MB -> {:.1}MB)",
                direction,
                memory.absolute_change_mb.abs(),
                memory.before_mb,
                memory.after_mb
            ));
        }

        let significant = phases
            .values()
            .filter(|p| p.percentage_change.abs() > SIGNIFICANT_PHASE_PERCENT)
            .count();
        if significant > 0 {
            messages.push(format!(
                "{} phase(s) changed by more than {:.0}%",
                significant, SIGNIFICANT_PHASE_PERCENT
            ));
        }

        ComparisonSummary {
            status,
            messages,
            overall_change_percent: duration.percentage_change,
        }
    }
}

fn compare_memory(before: &MetricRecord, after: &MetricRecord) -> MemoryChange {
    let before_bytes = before.memory.map(|m| m.current).unwrap_or(0) as i64;
    let after_bytes = after.memory.map(|m| m.current).unwrap_or(0) as i64;
    let (absolute, percentage) = change(before_bytes as f64, after_bytes as f64);

    MemoryChange {
        before_mb: bytes_to_mb(before_bytes),
        after_mb: bytes_to_mb(after_bytes),
        absolute_change_mb: bytes_to_mb(after_bytes.saturating_sub(before_bytes)),
        percentage_change: round_to(percentage, 2),
        improved: absolute < 0.0,
    }
}

fn compare_phases(before: &MetricRecord, after: &MetricRecord) -> IndexMap<String, PhaseChange> {
    let names = before.phases.keys().chain(after.phases.keys());
    let mut phases = IndexMap::new();

    for name in names {
        if phases.contains_key(name) {
            continue;
        }
        let b = before.phases.get(name).copied().unwrap_or(0.0);
        let a = after.phases.get(name).copied().unwrap_or(0.0);
        let (absolute, percentage) = change(b, a);
        phases.insert(
            name.clone(),
            PhaseChange {
                before: b,
                after: a,
                absolute_change: absolute,
                percentage_change: round_to(percentage, 2),
                improved: absolute < 0.0,
            },
        );
    }

    phases
}

fn compare_counts(before: &MetricRecord, after: &MetricRecord) -> IndexMap<String, CountChange> {
    let names = before.counts.keys().chain(after.counts.keys());
    let mut counts = IndexMap::new();

    for name in names {
        if counts.contains_key(name) {
            continue;
        }
        let b = before.counts.get(name).copied().unwrap_or(0);
        let a = after.counts.get(name).copied().unwrap_or(0);
        counts.insert(
            name.clone(),
            CountChange {
                before: b,
                after: a,
                change: a.saturating_sub(b),
            },
        );
    }

    counts
}

//! Human-readable and JSON output for records, aggregates and comparisons

use serde::Serialize;

use crate::collector::{AggregateStats, Percentiles};
use crate::comparator::ComparisonResult;
use crate::error::Result;
use crate::record::{MetricRecord, TIMESTAMP_KEY, WARNINGS_KEY};

const RULE_WIDTH: usize = 60;

fn rule() -> String {
    "-".repeat(RULE_WIDTH)
}

/// Pretty JSON for any of the plain-data shapes
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// One record as a table of phases, memory, counters and warnings
pub fn record_text(record: &MetricRecord) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "Operation '{}' ({:.3}s total)\n",
        record.operation, record.total
    ));
    output.push_str(&rule());
    output.push('\n');

    for (name, seconds) in &record.phases {
        let pct = if record.total > 0.0 {
            seconds / record.total * 100.0
        } else {
            0.0
        };
        output.push_str(&format!("{:<24} {:>10.3}s ({:>5.1}%)\n", name, seconds, pct));
    }

    if let Some(memory) = &record.memory {
        output.push_str(&format!(
            "Memory:                  current {:.2}MB, peak {:.2}MB, delta {:+.2}MB\n",
            memory.current_mb, memory.peak_mb, memory.delta_mb
        ));
    }

    for (name, value) in &record.counts {
        output.push_str(&format!("{:<24} {:>10}\n", name, value));
    }

    for (key, value) in &record.context {
        if key == WARNINGS_KEY || key == TIMESTAMP_KEY {
            continue;
        }
        output.push_str(&format!("{:<24} {}\n", key, value));
    }

    for warning in record.warnings() {
        output.push_str(&format!("WARNING: {}\n", warning));
    }

    output
}

fn percentiles_line(p: &Percentiles) -> String {
    format!(
        "p50={:.3}s p75={:.3}s p90={:.3}s p95={:.3}s p99={:.3}s",
        p.p50, p.p75, p.p90, p.p95, p.p99
    )
}

/// Aggregate statistics with one row per operation
pub fn aggregate_text(stats: &AggregateStats) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "Aggregate ({} operations, {:.3}s total, {:.3}s avg, {:.2}MB)\n",
        stats.total_operations, stats.total_duration, stats.avg_duration, stats.total_memory_mb
    ));
    output.push_str(&rule());
    output.push('\n');
    output.push_str(&percentiles_line(&stats.percentiles));
    output.push('\n');

    if stats.by_operation.is_empty() {
        return output;
    }

    output.push('\n');
    output.push_str(&format!(
        "{:<24} {:>6} {:>10} {:>10} {:>10} {:>10}\n",
        "operation", "count", "avg", "min", "max", "p95"
    ));
    for (name, op) in &stats.by_operation {
        output.push_str(&format!(
            "{:<24} {:>6} {:>9.3}s {:>9.3}s {:>9.3}s {:>9.3}s\n",
            name, op.count, op.avg_duration, op.min_duration, op.max_duration, op.percentiles.p95
        ));
    }

    output
}

/// Before/after comparison with the summary messages first
pub fn comparison_text(result: &ComparisonResult) -> String {
    let duration = &result.duration;
    let memory = &result.memory;

    let mut output = format!(
        "Comparison: {}\n\
         {}\n\
         Duration:           {:.3}s -> {:.3}s ({:+.2}%)\n\
         Memory:             {:.2}MB -> {:.2}MB ({:+.2}%)\n",
        result.summary.status.to_string().to_uppercase(),
        rule(),
        duration.before,
        duration.after,
        duration.percentage_change,
        memory.before_mb,
        memory.after_mb,
        memory.percentage_change
    );

    for message in &result.summary.messages {
        output.push_str(&format!("  * {}\n", message));
    }

    if !result.phases.is_empty() {
        output.push_str("\nPhases\n");
        for (name, phase) in &result.phases {
            output.push_str(&format!(
                "{:<24} {:>9.3}s -> {:>9.3}s ({:+.2}%)\n",
                name, phase.before, phase.after, phase.percentage_change
            ));
        }
    }

    if !result.counts.is_empty() {
        output.push_str("\nCounters\n");
        for (name, count) in &result.counts {
            output.push_str(&format!(
                "{:<24} {:>10} -> {:>10} ({:+})\n",
                name, count.before, count.after, count.change
            ));
        }
    }

    output
}

//! Threshold monitoring for finalized metric records
//!
//! A [`PerformanceMonitor`] checks a [`MetricRecord`] against a
//! [`ThresholdConfig`] and returns one warning string per violated threshold.
//! All checks run; nothing short-circuits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::error::{MetricsError, Result};
use crate::memory::{MemoryLimit, ProcessMemoryLimit};
use crate::record::MetricRecord;

/// Counter name the row-count threshold applies to
pub const ROWS_COUNTER: &str = "rows";

/// Performance thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Operation total above this many seconds is slow
    pub slow_operation_secs: f64,
    /// Phase value above this many seconds is slow
    pub slow_phase_secs: f64,
    /// Peak memory above this fraction of the memory limit is high
    pub high_memory_fraction: f64,
    /// `rows` counter above this is high (disabled when `None`)
    pub high_row_count: Option<u64>,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            slow_operation_secs: 1.0,
            slow_phase_secs: 0.5,
            high_memory_fraction: 0.9,
            high_row_count: None,
        }
    }
}

impl ThresholdConfig {
    /// Set the slow-operation threshold in seconds (> 0)
    pub fn slow_operation(mut self, secs: f64) -> Result<Self> {
        self.slow_operation_secs = positive("slow operation threshold", secs)?;
        Ok(self)
    }

    /// Set the slow-phase threshold in seconds (> 0)
    pub fn slow_phase(mut self, secs: f64) -> Result<Self> {
        self.slow_phase_secs = positive("slow phase threshold", secs)?;
        Ok(self)
    }

    /// Set the high-memory fraction, in (0, 1]
    pub fn high_memory(mut self, fraction: f64) -> Result<Self> {
        if !fraction.is_finite() || fraction <= 0.0 || fraction > 1.0 {
            return Err(MetricsError::Configuration(format!(
                "high memory threshold must be in (0, 1], got {}",
                fraction
            )));
        }
        self.high_memory_fraction = fraction;
        Ok(self)
    }

    /// Set the high row-count threshold (> 0)
    pub fn high_row_count(mut self, rows: u64) -> Result<Self> {
        if rows == 0 {
            return Err(MetricsError::Configuration(
                "high row count threshold must be greater than 0".to_string(),
            ));
        }
        self.high_row_count = Some(rows);
        Ok(self)
    }

    /// Re-check every field, for configs built by deserialization
    pub fn validate(self) -> Result<Self> {
        let config = Self::default()
            .slow_operation(self.slow_operation_secs)?
            .slow_phase(self.slow_phase_secs)?
            .high_memory(self.high_memory_fraction)?;
        match self.high_row_count {
            Some(rows) => config.high_row_count(rows),
            None => Ok(config),
        }
    }
}

fn positive(what: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(MetricsError::Configuration(format!(
            "{} must be greater than 0, got {}",
            what, value
        )))
    }
}

/// Evaluates records against thresholds
#[derive(Clone)]
pub struct PerformanceMonitor {
    thresholds: ThresholdConfig,
    limit: Arc<dyn MemoryLimit>,
}

impl fmt::Debug for PerformanceMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerformanceMonitor")
            .field("thresholds", &self.thresholds)
            .finish_non_exhaustive()
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(ThresholdConfig::default())
    }
}

impl PerformanceMonitor {
    /// Create a monitor using the process memory limit
    pub fn new(thresholds: ThresholdConfig) -> Self {
        Self::with_memory_limit(thresholds, Arc::new(ProcessMemoryLimit))
    }

    /// Create a monitor with an explicit memory-limit resolver
    pub fn with_memory_limit(thresholds: ThresholdConfig, limit: Arc<dyn MemoryLimit>) -> Self {
        Self { thresholds, limit }
    }

    pub fn thresholds(&self) -> &ThresholdConfig {
        &self.thresholds
    }

    pub fn slow_operation_threshold(mut self, secs: f64) -> Result<Self> {
        self.thresholds = self.thresholds.slow_operation(secs)?;
        Ok(self)
    }

    pub fn slow_phase_threshold(mut self, secs: f64) -> Result<Self> {
        self.thresholds = self.thresholds.slow_phase(secs)?;
        Ok(self)
    }

    pub fn high_memory_threshold(mut self, fraction: f64) -> Result<Self> {
        self.thresholds = self.thresholds.high_memory(fraction)?;
        Ok(self)
    }

    pub fn high_row_count_threshold(mut self, rows: u64) -> Result<Self> {
        self.thresholds = self.thresholds.high_row_count(rows)?;
        Ok(self)
    }

    /// Check a record against all thresholds.
    ///
    /// Warning order: operation, phases (encounter order), memory, row count.
    pub fn check_thresholds(&self, record: &MetricRecord) -> Vec<String> {
        let t = &self.thresholds;
        let mut warnings = Vec::new();

        if record.total > t.slow_operation_secs {
            warnings.push(format!(
                "Slow operation '{}': {:.3}s exceeds threshold of {:.3}s",
                record.operation, record.total, t.slow_operation_secs
            ));
        }

        for (phase, duration) in &record.phases {
            if *duration > t.slow_phase_secs {
                warnings.push(format!(
                    "Slow phase '{}' in '{}': {:.3}s exceeds threshold of {:.3}s",
                    phase, record.operation, duration, t.slow_phase_secs
                ));
            }
        }

        if let Some(memory) = record.memory {
            if let Some(limit) = self.limit.limit_bytes().filter(|l| *l > 0) {
                let fraction = memory.peak as f64 / limit as f64;
                if fraction > t.high_memory_fraction {
                    warnings.push(format!(
                        "High memory usage in '{}': peak {:.2}MB is {:.1}% of limit, exceeds threshold of {:.1}%",
                        record.operation,
                        memory.peak_mb,
                        fraction * 100.0,
                        t.high_memory_fraction * 100.0
                    ));
                }
            }
        }

        if let (Some(max_rows), Some(rows)) = (t.high_row_count, record.counts.get(ROWS_COUNTER)) {
            if *rows > 0 && *rows as u64 > max_rows {
                warnings.push(format!(
                    "High row count in '{}': {} rows exceeds threshold of {}",
                    record.operation, rows, max_rows
                ));
            }
        }

        for warning in &warnings {
            warn!(operation = %record.operation, "{}", warning);
        }

        warnings
    }
}

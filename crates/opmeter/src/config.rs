//! Engine configuration
//!
//! # Example
//! ```rust,ignore
//! use opmeter::{EngineConfig, ProfilerFactory};
//!
//! // From environment
//! let config = EngineConfig::from_env()?;
//!
//! // Or explicit configuration
//! let config = EngineConfig::default().with_sample_rate(0.25)?;
//!
//! let factory = ProfilerFactory::new(&config)?;
//! ```

use std::collections::HashMap;

use crate::error::{MetricsError, Result};
use crate::monitor::ThresholdConfig;
use crate::sampling::Sampler;

pub const ENV_ENABLED: &str = "OPMETER_ENABLED";
pub const ENV_SAMPLE_RATE: &str = "OPMETER_SAMPLE_RATE";
pub const ENV_SLOW_OPERATION: &str = "OPMETER_SLOW_OPERATION_SECS";
pub const ENV_SLOW_PHASE: &str = "OPMETER_SLOW_PHASE_SECS";
pub const ENV_HIGH_MEMORY: &str = "OPMETER_HIGH_MEMORY_FRACTION";
pub const ENV_HIGH_ROW_COUNT: &str = "OPMETER_HIGH_ROW_COUNT";

/// Configuration for a [`crate::ProfilerFactory`]
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// When false every profiler is the no-op variant
    pub enabled: bool,
    /// Fraction of operations measured, in `[0, 1]`
    pub sample_rate: f64,
    /// Thresholds for an attached monitor, `None` for no monitor
    pub thresholds: Option<ThresholdConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_rate: 1.0,
            thresholds: None,
        }
    }
}

impl EngineConfig {
    /// Configuration with profiling switched off
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_sample_rate(mut self, rate: f64) -> Result<Self> {
        self.sample_rate = Sampler::new(rate)?.rate();
        Ok(self)
    }

    pub fn with_thresholds(mut self, thresholds: ThresholdConfig) -> Result<Self> {
        self.thresholds = Some(thresholds.validate()?);
        Ok(self)
    }

    /// Build a sampler from `sample_rate`
    pub fn sampler(&self) -> Result<Sampler> {
        Sampler::new(self.sample_rate)
    }

    /// Create configuration from `OPMETER_*` environment variables.
    ///
    /// Setting any threshold variable attaches a monitor whose remaining
    /// thresholds keep their defaults.
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .filter(|(k, _)| k.starts_with("OPMETER_"))
            .collect();
        Self::from_vars(&vars)
    }

    /// Same as [`EngineConfig::from_env`] over an explicit variable map
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = vars.get(ENV_ENABLED) {
            config.enabled = parse_bool(ENV_ENABLED, raw)?;
        }
        if let Some(raw) = vars.get(ENV_SAMPLE_RATE) {
            config = config.with_sample_rate(parse_f64(ENV_SAMPLE_RATE, raw)?)?;
        }

        let mut thresholds = ThresholdConfig::default();
        let mut any_threshold = false;

        if let Some(raw) = vars.get(ENV_SLOW_OPERATION) {
            thresholds = thresholds.slow_operation(parse_f64(ENV_SLOW_OPERATION, raw)?)?;
            any_threshold = true;
        }
        if let Some(raw) = vars.get(ENV_SLOW_PHASE) {
            thresholds = thresholds.slow_phase(parse_f64(ENV_SLOW_PHASE, raw)?)?;
            any_threshold = true;
        }
        if let Some(raw) = vars.get(ENV_HIGH_MEMORY) {
            thresholds = thresholds.high_memory(parse_f64(ENV_HIGH_MEMORY, raw)?)?;
            any_threshold = true;
        }
        if let Some(raw) = vars.get(ENV_HIGH_ROW_COUNT) {
            let rows: u64 = raw.trim().parse().map_err(|_| {
                MetricsError::Configuration(format!(
                    "{} must be a positive integer, got '{}'",
                    ENV_HIGH_ROW_COUNT, raw
                ))
            })?;
            thresholds = thresholds.high_row_count(rows)?;
            any_threshold = true;
        }

        if any_threshold {
            config.thresholds = Some(thresholds);
        }

        Ok(config)
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(MetricsError::Configuration(format!(
            "{} must be a boolean, got '{}'",
            name, other
        ))),
    }
}

fn parse_f64(name: &str, raw: &str) -> Result<f64> {
    raw.trim().parse::<f64>().map_err(|_| {
        MetricsError::Configuration(format!("{} must be a number, got '{}'", name, raw))
    })
}

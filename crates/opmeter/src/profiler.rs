//! Operation profiling
//!
//! An [`OperationProfiler`] measures one operation: a [`Timer`] with named
//! checkpoints, memory at start and end, caller-defined counters and free-form
//! context. [`Profiling::end`] turns it into an immutable [`MetricRecord`].
//!
//! When profiling is disabled (or the operation is not sampled) the profiler is
//! the [`NullProfiler`] variant: every call is inert and `end()` returns an
//! empty record.
//!
//! # Example
//! ```rust,ignore
//! use opmeter::{EngineConfig, ProfilerFactory, Profiling};
//!
//! let factory = ProfilerFactory::new(&EngineConfig::from_env()?)?;
//! let mut profiler = factory.start("import_orders");
//! profiler.checkpoint("fetch")?;
//! profiler.add_count("rows", 1200);
//! let record = profiler.end();
//! ```

use chrono::Utc;
use indexmap::IndexMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::memory::{MemoryProbe, MemorySample, ProcessMemory};
use crate::monitor::PerformanceMonitor;
use crate::record::{ContextValue, MemoryStats, MetricRecord, TIMESTAMP_KEY, WARNINGS_KEY};
use crate::sampling::Sampler;
use crate::timer::Timer;

// ============================================================================
// Process-wide switch
// ============================================================================

static ENABLED: AtomicBool = AtomicBool::new(true);

/// Turn profiling on or off for profilers created by [`OperationProfiler::start`]
/// from now on. Profilers already running are unaffected.
pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

/// Current state of the process-wide switch
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

// ============================================================================
// Capability interface
// ============================================================================

/// Operations shared by the active and no-op profilers
pub trait Profiling {
    /// Record a named checkpoint (elapsed since start)
    fn checkpoint(&mut self, name: &str) -> Result<()>;

    /// Set a counter, overwriting any previous value
    fn add_count(&mut self, name: &str, value: i64);

    /// Add `delta` to a counter, starting from 0 if absent
    fn increment_count(&mut self, name: &str, delta: i64);

    /// Set a context entry, overwriting any previous value. The reserved
    /// `warnings` and `timestamp` keys are ignored.
    fn add_context(&mut self, key: &str, value: ContextValue);

    /// Finalize into a record. Repeated calls return the first result.
    fn end(&mut self) -> MetricRecord;

    /// Seconds since start, frozen after `end()`
    fn elapsed(&self) -> f64;

    /// Current process memory reading
    fn current_memory(&self) -> Option<MemorySample>;
}

// ============================================================================
// Active profiler
// ============================================================================

/// Profiler that actually measures
pub struct ActiveProfiler {
    name: String,
    timer: Timer,
    probe: Arc<dyn MemoryProbe>,
    memory_at_start: Option<u64>,
    counts: IndexMap<String, i64>,
    context: IndexMap<String, ContextValue>,
    monitor: Option<Arc<PerformanceMonitor>>,
    finalized: Option<MetricRecord>,
}

impl ActiveProfiler {
    /// Start measuring `name` with the process memory probe
    pub fn start(name: impl Into<String>, monitor: Option<Arc<PerformanceMonitor>>) -> Self {
        Self::start_with_probe(name, monitor, Arc::new(ProcessMemory))
    }

    /// Start measuring `name` with an explicit memory probe
    pub fn start_with_probe(
        name: impl Into<String>,
        monitor: Option<Arc<PerformanceMonitor>>,
        probe: Arc<dyn MemoryProbe>,
    ) -> Self {
        let name = name.into();
        let memory_at_start = probe.sample().map(|s| s.current);
        debug!(operation = %name, "profiler started");

        Self {
            name,
            timer: Timer::start(),
            probe,
            memory_at_start,
            counts: IndexMap::new(),
            context: IndexMap::new(),
            monitor,
            finalized: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_ended(&self) -> bool {
        self.finalized.is_some()
    }

    fn frozen(&self, what: &str) -> bool {
        if self.finalized.is_some() {
            debug!(operation = %self.name, "ignoring {} after end()", what);
            true
        } else {
            false
        }
    }

    fn build_record(&mut self) -> MetricRecord {
        let summary = self.timer.end();

        let mut record = MetricRecord::new(self.name.clone(), summary.total);
        record.phases = summary.checkpoints;

        if let (Some(start), Some(sample)) = (self.memory_at_start, self.probe.sample()) {
            let delta = (sample.current as i64).saturating_sub(start as i64);
            record.memory = Some(MemoryStats::new(sample.current, sample.peak, delta));
        }

        record.counts = std::mem::take(&mut self.counts);
        record.context = std::mem::take(&mut self.context);
        record.context.insert(
            TIMESTAMP_KEY.to_string(),
            ContextValue::String(Utc::now().to_rfc3339()),
        );

        if let Some(monitor) = &self.monitor {
            let warnings = monitor.check_thresholds(&record);
            if !warnings.is_empty() {
                record.context.insert(
                    WARNINGS_KEY.to_string(),
                    ContextValue::List(warnings.into_iter().map(ContextValue::String).collect()),
                );
            }
        }

        record
    }
}

impl Profiling for ActiveProfiler {
    fn checkpoint(&mut self, name: &str) -> Result<()> {
        self.timer.checkpoint(name).map(|_| ())
    }

    fn add_count(&mut self, name: &str, value: i64) {
        if self.frozen("add_count") {
            return;
        }
        self.counts.insert(name.to_string(), value);
    }

    fn increment_count(&mut self, name: &str, delta: i64) {
        if self.frozen("increment_count") {
            return;
        }
        let count = self.counts.entry(name.to_string()).or_insert(0);
        *count = count.saturating_add(delta);
    }

    fn add_context(&mut self, key: &str, value: ContextValue) {
        if self.frozen("add_context") {
            return;
        }
        if key == WARNINGS_KEY || key == TIMESTAMP_KEY {
            debug!(operation = %self.name, key, "ignoring reserved context key");
            return;
        }
        self.context.insert(key.to_string(), value);
    }

    fn end(&mut self) -> MetricRecord {
        if let Some(record) = &self.finalized {
            return record.clone();
        }

        let record = self.build_record();
        debug!(
            operation = %record.operation,
            total = record.total,
            phases = record.phases.len(),
            warnings = record.warnings().len(),
            "profiler finalized"
        );
        self.finalized = Some(record.clone());
        record
    }

    fn elapsed(&self) -> f64 {
        self.timer.elapsed()
    }

    fn current_memory(&self) -> Option<MemorySample> {
        self.probe.sample()
    }
}

// ============================================================================
// No-op profiler
// ============================================================================

/// Profiler used when measurement is disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProfiler;

impl Profiling for NullProfiler {
    fn checkpoint(&mut self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn add_count(&mut self, _name: &str, _value: i64) {}

    fn increment_count(&mut self, _name: &str, _delta: i64) {}

    fn add_context(&mut self, _key: &str, _value: ContextValue) {}

    fn end(&mut self) -> MetricRecord {
        MetricRecord::empty()
    }

    fn elapsed(&self) -> f64 {
        0.0
    }

    fn current_memory(&self) -> Option<MemorySample> {
        None
    }
}

// ============================================================================
// Tagged profiler
// ============================================================================

/// Either an active or a no-op profiler, chosen at construction
pub enum OperationProfiler {
    Active(ActiveProfiler),
    Null(NullProfiler),
}

impl OperationProfiler {
    /// Start profiling `name`, honoring the process-wide switch
    pub fn start(name: impl Into<String>, monitor: Option<Arc<PerformanceMonitor>>) -> Self {
        if is_enabled() {
            OperationProfiler::Active(ActiveProfiler::start(name, monitor))
        } else {
            OperationProfiler::Null(NullProfiler)
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, OperationProfiler::Active(_))
    }

    /// Increment a counter by one
    pub fn increment(&mut self, name: &str) {
        self.increment_count(name, 1);
    }

    /// Set a context entry from anything convertible to a [`ContextValue`]
    pub fn context(&mut self, key: &str, value: impl Into<ContextValue>) {
        self.add_context(key, value.into());
    }

    fn inner(&self) -> &dyn Profiling {
        match self {
            OperationProfiler::Active(p) => p,
            OperationProfiler::Null(p) => p,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Profiling {
        match self {
            OperationProfiler::Active(p) => p,
            OperationProfiler::Null(p) => p,
        }
    }
}

impl Profiling for OperationProfiler {
    fn checkpoint(&mut self, name: &str) -> Result<()> {
        self.inner_mut().checkpoint(name)
    }

    fn add_count(&mut self, name: &str, value: i64) {
        self.inner_mut().add_count(name, value)
    }

    fn increment_count(&mut self, name: &str, delta: i64) {
        self.inner_mut().increment_count(name, delta)
    }

    fn add_context(&mut self, key: &str, value: ContextValue) {
        self.inner_mut().add_context(key, value)
    }

    fn end(&mut self) -> MetricRecord {
        self.inner_mut().end()
    }

    fn elapsed(&self) -> f64 {
        self.inner().elapsed()
    }

    fn current_memory(&self) -> Option<MemorySample> {
        self.inner().current_memory()
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Creates profilers from an explicit [`EngineConfig`]
#[derive(Clone)]
pub struct ProfilerFactory {
    enabled: bool,
    sampler: Sampler,
    monitor: Option<Arc<PerformanceMonitor>>,
    probe: Arc<dyn MemoryProbe>,
}

impl ProfilerFactory {
    /// Build a factory, attaching a monitor when thresholds are configured
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let monitor = match config.thresholds {
            Some(thresholds) => Some(Arc::new(PerformanceMonitor::new(thresholds.validate()?))),
            None => None,
        };

        Ok(Self {
            enabled: config.enabled,
            sampler: config.sampler()?,
            monitor,
            probe: Arc::new(ProcessMemory),
        })
    }

    /// Factory that only hands out no-op profilers
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            sampler: Sampler::default(),
            monitor: None,
            probe: Arc::new(ProcessMemory),
        }
    }

    pub fn with_monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn with_memory_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn monitor(&self) -> Option<&Arc<PerformanceMonitor>> {
        self.monitor.as_ref()
    }

    /// Start profiling `name`
    pub fn start(&self, name: impl Into<String>) -> OperationProfiler {
        if !self.enabled || !self.sampler.should_sample() {
            return OperationProfiler::Null(NullProfiler);
        }
        OperationProfiler::Active(ActiveProfiler::start_with_probe(
            name,
            self.monitor.clone(),
            self.probe.clone(),
        ))
    }

    /// Run `f` under a profiler and return its output with the finalized record
    pub fn profile<F, R>(&self, name: impl Into<String>, f: F) -> (R, MetricRecord)
    where
        F: FnOnce(&mut OperationProfiler) -> R,
    {
        let mut profiler = self.start(name);
        let output = f(&mut profiler);
        let record = profiler.end();
        (output, record)
    }
}

//! opmeter: per-operation performance metrics
//!
//! Measures named operations and turns each into an immutable
//! [`MetricRecord`]:
//! - Wall-clock timing with named checkpoints
//! - Resident memory at start and end, plus the process peak
//! - Caller-defined counters and free-form context
//! - Threshold warnings (slow operation, slow phase, high memory, row count)
//! - Batch aggregation with nearest-rank percentiles
//! - Before/after comparison with regression detection
//!
//! # Example
//!
//! ```rust,ignore
//! use opmeter::{EngineConfig, MetricsCollector, ProfilerFactory, Profiling};
//!
//! let factory = ProfilerFactory::new(&EngineConfig::from_env()?)?;
//! let collector = MetricsCollector::new();
//!
//! let mut profiler = factory.start("import_orders");
//! profiler.checkpoint("fetch")?;
//! profiler.add_count("rows", 1200);
//! collector.record("import_orders", profiler.end());
//!
//! println!("{}", opmeter::render::aggregate_text(&collector.aggregate()));
//! ```

pub mod collector;
pub mod comparator;
pub mod config;
pub mod error;
pub mod memory;
pub mod monitor;
pub mod profiler;
pub mod record;
pub mod render;
pub mod sampling;
pub mod store;
pub mod timer;

// Re-export main types
pub use collector::{
    percentile, AggregateStats, CollectedMetric, MetricsCollector, OperationStats, Percentiles,
};
pub use comparator::{
    ComparisonResult, ComparisonStatus, ComparisonSummary, CountChange, DurationChange,
    MemoryChange, MetricsComparator, PhaseChange,
};
pub use config::EngineConfig;
pub use error::{MetricsError, Result};
pub use memory::{
    FixedMemoryLimit, MemoryLimit, MemoryProbe, MemorySample, ProcessMemory, ProcessMemoryLimit,
};
pub use monitor::{PerformanceMonitor, ThresholdConfig};
pub use profiler::{
    is_enabled, set_enabled, ActiveProfiler, NullProfiler, OperationProfiler, ProfilerFactory,
    Profiling,
};
pub use record::{ContextValue, MemoryStats, MetricRecord};
pub use sampling::Sampler;
pub use store::{FileStore, MemoryStore, MetricsStore};
pub use timer::{Timer, TimerSummary};

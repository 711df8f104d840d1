//! Immutable metric record produced when an operation is finalized
//!
//! The serialized shape omits empty sub-maps entirely: a missing `phases`,
//! `memory`, `counts` or `context` key means "no data", never zero.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::memory::bytes_to_mb;

/// Reserved context key under which monitor warnings are attached
pub const WARNINGS_KEY: &str = "warnings";

/// Reserved context key holding the finalization timestamp
pub const TIMESTAMP_KEY: &str = "timestamp";

// ============================================================================
// Context Values
// ============================================================================

/// Free-form context value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<ContextValue>),
    Map(IndexMap<String, ContextValue>),
}

impl ContextValue {
    /// Borrow as a string if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ContextValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow as a list if this is a list value
    pub fn as_list(&self) -> Option<&[ContextValue]> {
        match self {
            ContextValue::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextValue::Bool(b) => write!(f, "{}", b),
            ContextValue::Int(i) => write!(f, "{}", i),
            ContextValue::Float(x) => write!(f, "{}", x),
            ContextValue::String(s) => write!(f, "{}", s),
            ContextValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            ContextValue::Map(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

impl From<bool> for ContextValue {
    fn from(v: bool) -> Self {
        ContextValue::Bool(v)
    }
}

impl From<i64> for ContextValue {
    fn from(v: i64) -> Self {
        ContextValue::Int(v)
    }
}

impl From<i32> for ContextValue {
    fn from(v: i32) -> Self {
        ContextValue::Int(v as i64)
    }
}

impl From<u32> for ContextValue {
    fn from(v: u32) -> Self {
        ContextValue::Int(v as i64)
    }
}

impl From<f64> for ContextValue {
    fn from(v: f64) -> Self {
        ContextValue::Float(v)
    }
}

impl From<&str> for ContextValue {
    fn from(v: &str) -> Self {
        ContextValue::String(v.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(v: String) -> Self {
        ContextValue::String(v)
    }
}

impl From<Vec<ContextValue>> for ContextValue {
    fn from(v: Vec<ContextValue>) -> Self {
        ContextValue::List(v)
    }
}

impl From<IndexMap<String, ContextValue>> for ContextValue {
    fn from(v: IndexMap<String, ContextValue>) -> Self {
        ContextValue::Map(v)
    }
}

// ============================================================================
// Memory Stats
// ============================================================================

/// Raw byte fields, the only part of [`MemoryStats`] read back on deserialize
#[derive(Deserialize)]
struct MemoryBytes {
    #[serde(default)]
    current: u64,
    #[serde(default)]
    peak: u64,
    #[serde(default)]
    delta: i64,
}

impl From<MemoryBytes> for MemoryStats {
    fn from(raw: MemoryBytes) -> Self {
        MemoryStats::new(raw.current, raw.peak, raw.delta)
    }
}

/// Memory usage of one operation
///
/// The `*_mb` fields are derived from the byte fields and are recomputed on
/// deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "MemoryBytes")]
pub struct MemoryStats {
    /// Resident bytes at finalize
    pub current: u64,
    /// Process peak resident bytes at finalize
    pub peak: u64,
    /// `current` minus resident bytes at start
    pub delta: i64,
    pub current_mb: f64,
    pub peak_mb: f64,
    pub delta_mb: f64,
}

impl MemoryStats {
    pub fn new(current: u64, peak: u64, delta: i64) -> Self {
        Self {
            current,
            peak,
            delta,
            current_mb: bytes_to_mb(current as i64),
            peak_mb: bytes_to_mb(peak as i64),
            delta_mb: bytes_to_mb(delta),
        }
    }
}

// ============================================================================
// Metric Record
// ============================================================================

/// Snapshot of one finalized operation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Operation name
    pub operation: String,
    /// Total duration in seconds, never negative
    #[serde(deserialize_with = "deserialize_duration")]
    pub total: f64,
    /// Phase name -> seconds since operation start
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub phases: IndexMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryStats>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub counts: IndexMap<String, i64>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub context: IndexMap<String, ContextValue>,
}

impl MetricRecord {
    /// Create a record with only a name and a duration.
    ///
    /// Negative or non-finite durations are clamped to zero.
    pub fn new(operation: impl Into<String>, total: f64) -> Self {
        Self {
            operation: operation.into(),
            total: sanitize_duration(total),
            ..Default::default()
        }
    }

    /// The record returned by a disabled profiler
    pub fn empty() -> Self {
        Self::default()
    }

    /// True for the record a disabled profiler returns
    pub fn is_empty(&self) -> bool {
        self.operation.is_empty()
            && self.total == 0.0
            && self.phases.is_empty()
            && self.memory.is_none()
            && self.counts.is_empty()
            && self.context.is_empty()
    }

    pub fn with_phase(mut self, name: impl Into<String>, seconds: f64) -> Self {
        self.phases.insert(name.into(), seconds);
        self
    }

    pub fn with_memory(mut self, memory: MemoryStats) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_count(mut self, name: impl Into<String>, value: i64) -> Self {
        self.counts.insert(name.into(), value);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Warnings attached by a monitor, empty if none fired
    pub fn warnings(&self) -> Vec<&str> {
        self.context
            .get(WARNINGS_KEY)
            .and_then(ContextValue::as_list)
            .map(|items| items.iter().filter_map(ContextValue::as_str).collect())
            .unwrap_or_default()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings().is_empty()
    }

    /// Peak memory in bytes, 0 when memory was not sampled
    pub fn peak_memory(&self) -> u64 {
        self.memory.map(|m| m.peak).unwrap_or(0)
    }

    /// Current memory in MB, 0.0 when memory was not sampled
    pub fn current_memory_mb(&self) -> f64 {
        self.memory.map(|m| m.current_mb).unwrap_or(0.0)
    }

    /// Export to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    f64::deserialize(deserializer).map(sanitize_duration)
}

pub(crate) fn sanitize_duration(total: f64) -> f64 {
    if total.is_finite() && total > 0.0 {
        total
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> MetricRecord {
        let mut nested = IndexMap::new();
        nested.insert("region".to_string(), ContextValue::from("eu-west"));
        nested.insert("retries".to_string(), ContextValue::from(2i64));

        MetricRecord::new("import_orders", 1.25)
            .with_phase("fetch", 0.4)
            .with_phase("parse", 0.9)
            .with_memory(MemoryStats::new(104_857_600, 157_286_400, 5_242_880))
            .with_count("rows", 1200)
            .with_count("batches", 3)
            .with_context("source", "s3")
            .with_context("dry_run", false)
            .with_context("ratio", 0.75)
            .with_context("meta", nested)
    }

    #[test]
    fn test_memory_stats_derived_fields() {
        let mem = MemoryStats::new(104_857_600, 157_286_400, -1_048_576);
        assert_eq!(mem.current_mb, 100.0);
        assert_eq!(mem.peak_mb, 150.0);
        assert_eq!(mem.delta_mb, -1.0);
    }

    #[test]
    fn test_empty_maps_are_omitted() {
        let record = MetricRecord::new("noop", 0.01);
        let value = serde_json::to_value(&record).unwrap();
        let obj = value.as_object().unwrap();

        assert_eq!(obj.len(), 2);
        assert!(obj.contains_key("operation"));
        assert!(obj.contains_key("total"));
        assert!(!obj.contains_key("phases"));
        assert!(!obj.contains_key("memory"));
        assert!(!obj.contains_key("counts"));
        assert!(!obj.contains_key("context"));
    }

    #[test]
    fn test_json_roundtrip_preserves_fields() {
        let record = sample_record();
        let json = record.to_json().unwrap();
        let restored = MetricRecord::from_json(&json).unwrap();

        assert_eq!(restored.operation, record.operation);
        assert_eq!(restored.total, record.total);
        assert_eq!(restored.phases, record.phases);
        assert_eq!(restored.counts, record.counts);
        assert_eq!(restored.context, record.context);

        let mem = restored.memory.unwrap();
        assert_eq!(mem.current, 104_857_600);
        assert_eq!(mem.peak, 157_286_400);
        assert_eq!(mem.delta, 5_242_880);
    }

    #[test]
    fn test_mb_fields_recomputed_from_bytes() {
        let json = r#"{
            "operation": "op",
            "total": 0.5,
            "memory": {"current": 3145728, "peak": 4194304, "delta": 1048576, "current_mb": 999.0}
        }"#;
        let record = MetricRecord::from_json(json).unwrap();
        let mem = record.memory.unwrap();

        assert_eq!(mem.current_mb, 3.0);
        assert_eq!(mem.peak_mb, 4.0);
        assert_eq!(mem.delta_mb, 1.0);
    }

    #[test]
    fn test_phase_order_preserved() {
        let json = r#"{"operation":"op","total":1.0,"phases":{"z":0.1,"a":0.2,"m":0.3}}"#;
        let record = MetricRecord::from_json(json).unwrap();
        let names: Vec<_> = record.phases.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_warnings_accessor() {
        let record = MetricRecord::new("op", 1.0).with_context(
            WARNINGS_KEY,
            vec![ContextValue::from("Slow operation"), ContextValue::from("Slow phase")],
        );
        assert_eq!(record.warnings(), vec!["Slow operation", "Slow phase"]);
        assert!(record.has_warnings());
        assert!(!MetricRecord::new("op", 1.0).has_warnings());
    }

    #[test]
    fn test_negative_total_clamped() {
        assert_eq!(MetricRecord::new("op", -3.0).total, 0.0);
        assert_eq!(MetricRecord::new("op", f64::NAN).total, 0.0);
    }

    #[test]
    fn test_negative_total_clamped_on_deserialize() {
        let record = MetricRecord::from_json(r#"{"operation":"op","total":-5.0}"#).unwrap();
        assert_eq!(record.total, 0.0);

        let record = MetricRecord::from_json(r#"{"operation":"op","total":2.5}"#).unwrap();
        assert_eq!(record.total, 2.5);
    }

    #[test]
    fn test_empty_record() {
        let record = MetricRecord::empty();
        assert!(record.is_empty());
        assert!(!sample_record().is_empty());
    }

    #[test]
    fn test_context_value_untagged() {
        let json = r#"{"a": true, "b": 3, "c": 2.5, "d": "x", "e": [1, "y"], "f": {"g": null}}"#;
        let parsed: Result<IndexMap<String, ContextValue>, _> = serde_json::from_str(json);
        // null is not part of the closed variant set
        assert!(parsed.is_err());

        let json = r#"{"a": true, "b": 3, "c": 2.5, "d": "x", "e": [1, "y"], "f": {"g": 1}}"#;
        let parsed: IndexMap<String, ContextValue> = serde_json::from_str(json).unwrap();
        assert_eq!(parsed["a"], ContextValue::Bool(true));
        assert_eq!(parsed["b"], ContextValue::Int(3));
        assert_eq!(parsed["c"], ContextValue::Float(2.5));
        assert_eq!(parsed["d"], ContextValue::String("x".to_string()));
        assert!(matches!(parsed["e"], ContextValue::List(_)));
        assert!(matches!(parsed["f"], ContextValue::Map(_)));
    }
}

//! Checkpoint timer
//!
//! Measures elapsed wall-clock time for one operation and records named
//! checkpoints as elapsed-since-start. Once ended the timer is frozen.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::error::{MetricsError, Result};

/// Frozen result of [`Timer::end`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimerSummary {
    /// Total elapsed seconds between start and end
    pub total: f64,
    /// Checkpoint name -> seconds since start, in recording order
    pub checkpoints: IndexMap<String, f64>,
}

/// Timer with named checkpoints
#[derive(Debug, Clone)]
pub struct Timer {
    start: Instant,
    end: Option<Instant>,
    checkpoints: IndexMap<String, f64>,
}

impl Timer {
    /// Start a new timer
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            end: None,
            checkpoints: IndexMap::new(),
        }
    }

    /// Record a checkpoint under `name`.
    ///
    /// The stored value is the elapsed time since start, not since the previous
    /// checkpoint. Re-using a name overwrites the earlier value but keeps its
    /// original position.
    pub fn checkpoint(&mut self, name: &str) -> Result<f64> {
        if name.is_empty() {
            return Err(MetricsError::InvalidOperation(
                "checkpoint name must not be empty".to_string(),
            ));
        }
        if self.end.is_some() {
            return Err(MetricsError::InvalidOperation(format!(
                "cannot record checkpoint '{}' on an ended timer",
                name
            )));
        }

        let elapsed = self.start.elapsed().as_secs_f64();
        self.checkpoints.insert(name.to_string(), elapsed);
        Ok(elapsed)
    }

    /// Stop the timer.
    ///
    /// Only the first call freezes the end instant; later calls return the same
    /// summary without re-measuring.
    pub fn end(&mut self) -> TimerSummary {
        let end = *self.end.get_or_insert_with(Instant::now);
        TimerSummary {
            total: end.duration_since(self.start).as_secs_f64(),
            checkpoints: self.checkpoints.clone(),
        }
    }

    /// Elapsed seconds: live before `end()`, frozen after
    pub fn elapsed(&self) -> f64 {
        self.elapsed_duration().as_secs_f64()
    }

    /// Elapsed time as a [`Duration`]
    pub fn elapsed_duration(&self) -> Duration {
        match self.end {
            Some(end) => end.duration_since(self.start),
            None => self.start.elapsed(),
        }
    }

    /// Whether `end()` has been called
    pub fn is_ended(&self) -> bool {
        self.end.is_some()
    }

    /// Checkpoints recorded so far
    pub fn checkpoints(&self) -> &IndexMap<String, f64> {
        &self.checkpoints
    }
}

//! Probabilistic admission of operations to full measurement

use rand::Rng;

use crate::error::{MetricsError, Result};

/// Admits a fraction of operations, given by a rate in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampler {
    rate: f64,
}

impl Default for Sampler {
    fn default() -> Self {
        Self { rate: 1.0 }
    }
}

impl Sampler {
    pub fn new(rate: f64) -> Result<Self> {
        if !rate.is_finite() || !(0.0..=1.0).contains(&rate) {
            return Err(MetricsError::Configuration(format!(
                "sample rate must be in [0, 1], got {}",
                rate
            )));
        }
        Ok(Self { rate })
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Decide whether the next operation is measured
    pub fn should_sample(&self) -> bool {
        self.should_sample_with(&mut rand::thread_rng())
    }

    /// Same as [`Sampler::should_sample`] with a caller-provided RNG
    pub fn should_sample_with<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        if self.rate >= 1.0 {
            return true;
        }
        if self.rate <= 0.0 {
            return false;
        }
        rng.gen::<f64>() < self.rate
    }
}

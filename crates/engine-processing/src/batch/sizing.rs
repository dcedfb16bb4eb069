use crate::error::SizingError;
use std::time::Duration;
use tracing::debug;

/// Bounds and feedback constants for adaptive batch sizing.
#[derive(Debug, Clone, PartialEq)]
pub struct SizingConfig {
    pub initial_size: usize,
    pub min_size: usize,
    pub max_size: usize,
    pub target_latency: Duration,
    /// Relative half-width of the latency window around `target_latency`.
    pub tolerance: f64,
    pub growth_factor: f64,
    pub shrink_factor: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        SizingConfig {
            initial_size: 50,
            min_size: 10,
            max_size: 500,
            target_latency: Duration::from_secs(2),
            tolerance: 0.25,
            growth_factor: 1.5,
            shrink_factor: 0.5,
        }
    }
}

impl SizingConfig {
    pub fn with_bounds(mut self, initial: usize, min: usize, max: usize) -> Self {
        self.initial_size = initial;
        self.min_size = min;
        self.max_size = max;
        self
    }

    pub fn with_target_latency(mut self, target: Duration) -> Self {
        self.target_latency = target;
        self
    }

    pub fn with_factors(mut self, growth: f64, shrink: f64) -> Self {
        self.growth_factor = growth;
        self.shrink_factor = shrink;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn validate(&self) -> Result<(), SizingError> {
        if self.min_size == 0 || self.max_size == 0 {
            return Err(SizingError::ZeroSize {
                min: self.min_size,
                max: self.max_size,
            });
        }
        if self.min_size > self.max_size {
            return Err(SizingError::InvertedBounds {
                min: self.min_size,
                max: self.max_size,
            });
        }
        if !(self.min_size..=self.max_size).contains(&self.initial_size) {
            return Err(SizingError::InitialOutOfBounds {
                initial: self.initial_size,
                min: self.min_size,
                max: self.max_size,
            });
        }
        if !self.growth_factor.is_finite() || self.growth_factor <= 1.0 {
            return Err(SizingError::GrowthFactor(self.growth_factor));
        }
        if !self.shrink_factor.is_finite() || self.shrink_factor <= 0.0 || self.shrink_factor >= 1.0
        {
            return Err(SizingError::ShrinkFactor(self.shrink_factor));
        }
        if !self.tolerance.is_finite() || !(0.0..1.0).contains(&self.tolerance) {
            return Err(SizingError::Tolerance(self.tolerance));
        }
        Ok(())
    }

    /// Lower and upper edge of the accepted latency window.
    pub fn latency_window(&self) -> (Duration, Duration) {
        (
            self.target_latency.mul_f64(1.0 - self.tolerance),
            self.target_latency.mul_f64(1.0 + self.tolerance),
        )
    }
}

/// Direction the sizer moved after observing a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeAdjustment {
    Grew,
    Shrank,
    Held,
}

/// Feedback loop that keeps batch latency inside the configured window.
#[derive(Debug, Clone)]
pub struct AdaptiveSizer {
    config: SizingConfig,
    current: usize,
}

impl AdaptiveSizer {
    pub fn new(config: SizingConfig) -> Result<Self, SizingError> {
        config.validate()?;
        Ok(AdaptiveSizer {
            current: config.initial_size,
            config,
        })
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn config(&self) -> &SizingConfig {
        &self.config
    }

    /// Feeds one batch duration back and returns how the size moved.
    pub fn observe(&mut self, elapsed: Duration) -> SizeAdjustment {
        let (low, high) = self.config.latency_window();
        let previous = self.current;

        let proposed = if elapsed < low {
            let scaled = (previous as f64 * self.config.growth_factor).floor() as usize;
            scaled.max(previous.saturating_add(1))
        } else if elapsed > high {
            let scaled = (previous as f64 * self.config.shrink_factor).ceil() as usize;
            scaled.min(previous.saturating_sub(1))
        } else {
            previous
        };

        self.current = proposed.clamp(self.config.min_size, self.config.max_size);

        let adjustment = match self.current.cmp(&previous) {
            std::cmp::Ordering::Greater => SizeAdjustment::Grew,
            std::cmp::Ordering::Less => SizeAdjustment::Shrank,
            std::cmp::Ordering::Equal => SizeAdjustment::Held,
        };

        debug!(
            elapsed_ms = elapsed.as_millis() as u64,
            previous,
            next = self.current,
            ?adjustment,
            "Batch size observed"
        );
        adjustment
    }

    pub fn reset(&mut self) {
        self.current = self.config.initial_size;
    }
}

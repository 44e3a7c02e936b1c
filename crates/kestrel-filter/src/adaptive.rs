//! Online noise adaptation from the innovation sequence.
//!
//! Keeps a bounded window of recent innovations. Every `interval`
//! observations, once the window has warmed up, the empirical innovation
//! covariance is blended into `R` and `Q` is scaled up or down by how large
//! the latest innovation is. Both matrices are then sanitized.

use kestrel_core::config::AdaptationConfig;
use std::collections::VecDeque;
use tracing::debug;

use crate::estimator::KalmanEstimator;
use crate::guard;
use crate::model::{Measurement, NoiseMatrix};

pub struct AdaptiveNoiseController {
    settings: AdaptationConfig,
    window: VecDeque<Measurement>,
}

impl AdaptiveNoiseController {
    pub fn new(settings: AdaptationConfig) -> Self {
        let window = VecDeque::with_capacity(settings.window_capacity);
        Self { settings, window }
    }

    /// Append an innovation, evicting the oldest past capacity. The window
    /// always holds at least the latest innovation.
    pub fn record(&mut self, innovation: Measurement) {
        while self.window.len() >= self.settings.window_capacity.max(1) {
            self.window.pop_front();
        }
        self.window.push_back(innovation);
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Sample covariance (`n - 1` denominator) of the windowed innovations.
    pub fn innovation_covariance(&self) -> Option<NoiseMatrix> {
        let n = self.window.len();
        if n < 2 {
            return None;
        }
        let mean = self.window.iter().sum::<Measurement>() / n as f64;
        let scatter = self
            .window
            .iter()
            .map(|y| {
                let d = y - mean;
                d * d.transpose()
            })
            .sum::<NoiseMatrix>();
        Some(scatter / (n - 1) as f64)
    }

    /// Revise the estimator's `Q` and `R` when the cadence and warm-up allow.
    /// Returns whether an adaptation ran.
    pub fn maybe_adapt(&self, observation_count: u64, estimator: &mut KalmanEstimator) -> bool {
        let s = &self.settings;
        if !s.enabled
            || observation_count == 0
            || observation_count % s.interval != 0
            || self.window.len() < s.min_observations
        {
            return false;
        }
        let (Ok(&q), Ok(&r)) = (estimator.process_noise(), estimator.measurement_noise()) else {
            return false;
        };
        let Some(innovation_cov) = self.innovation_covariance() else {
            return false;
        };

        let mut r = r * (1.0 - s.learning_rate) + innovation_cov * s.learning_rate;

        let mut q = q;
        let mut scale = 1.0;
        if let Some(y) = estimator.last_innovation() {
            let error = y.abs().mean();
            if error > s.high_error_threshold {
                scale = s.growth_factor;
            } else if error < s.low_error_threshold {
                scale = s.shrink_factor;
            }
        }
        q *= scale;

        let bounds = estimator.settings();
        q = guard::sanitize(&q, bounds.min_process_noise, bounds.max_process_noise);
        r = guard::sanitize(&r, bounds.min_variance, bounds.max_variance);

        debug!(
            "adapt @{observation_count}: window {} | Q scale {scale} | R diag [{:.4}, {:.4}, {:.4}]",
            self.window.len(),
            r[(0, 0)],
            r[(1, 1)],
            r[(2, 2)],
        );
        estimator.set_noise(q, r).is_ok()
    }
}

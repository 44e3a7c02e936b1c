//! Estimator output types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Output names in the order the inference boundary emits them.
pub const OUTPUT_NAMES: [&str; 5] = [
    "cpu_prediction",
    "prediction_variance",
    "innovation",
    "cpu_trend",
    "model_confidence",
];

/// Everything the estimator reports for one processed tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickEstimate {
    /// Posterior CPU utilization, clamped to `[0, 1]`.
    pub predicted_cpu: f64,
    /// `P[0,0]` clamped to the variance bounds (the reset value after a reset).
    pub prediction_variance: f64,
    /// Euclidean norm of the innovation `z - Hx`.
    pub innovation_magnitude: f64,
    pub cpu_trend: f64,
    /// `1 / (1 + 0.1·trace(P)/5 + 0.1·|y|)`, in `[0, 1]`.
    pub confidence: f64,
    /// Whether `P` was reset to its initial value on this tick.
    pub variance_reset: bool,
}

impl fmt::Display for TickEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cpu {:.1}% (var {:.4}) | trend {:+.4} | innovation {:.4} | conf: {:.0}%{}",
            self.predicted_cpu * 100.0,
            self.prediction_variance,
            self.cpu_trend,
            self.innovation_magnitude,
            self.confidence * 100.0,
            if self.variance_reset { " | RESET" } else { "" },
        )
    }
}

/// Column-oriented estimates for a batch, one entry per input tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastSeries {
    pub cpu_prediction: Vec<f64>,
    pub prediction_variance: Vec<f64>,
    pub innovation: Vec<f64>,
    pub cpu_trend: Vec<f64>,
    pub model_confidence: Vec<f64>,
}

impl ForecastSeries {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            cpu_prediction: Vec::with_capacity(n),
            prediction_variance: Vec::with_capacity(n),
            innovation: Vec::with_capacity(n),
            cpu_trend: Vec::with_capacity(n),
            model_confidence: Vec::with_capacity(n),
        }
    }

    pub fn push(&mut self, tick: &TickEstimate) {
        self.cpu_prediction.push(tick.predicted_cpu);
        self.prediction_variance.push(tick.prediction_variance);
        self.innovation.push(tick.innovation_magnitude);
        self.cpu_trend.push(tick.cpu_trend);
        self.model_confidence.push(tick.confidence);
    }

    pub fn len(&self) -> usize {
        self.cpu_prediction.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cpu_prediction.is_empty()
    }

    /// Columns in [`OUTPUT_NAMES`] order.
    pub fn into_columns(self) -> [Vec<f64>; 5] {
        [
            self.cpu_prediction,
            self.prediction_variance,
            self.innovation,
            self.cpu_trend,
            self.model_confidence,
        ]
    }
}

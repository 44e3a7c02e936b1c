//! Cleaning of raw observation batches before they reach the estimator.
//!
//! Missing values (NaN or infinite) are forward-filled when rare and
//! mean-filled otherwise; outliers are capped at `mean ± k·std`; each feature
//! is then clamped to its physical range.

use kestrel_core::config::PreprocessConfig;
use tracing::warn;

use crate::model::Measurement;

/// Three aligned observation series: CPU ratio, memory ratio, load average.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationBatch {
    pub cpu: Vec<f64>,
    pub memory: Vec<f64>,
    pub load: Vec<f64>,
}

impl ObservationBatch {
    pub fn new(cpu: Vec<f64>, memory: Vec<f64>, load: Vec<f64>) -> Self {
        Self { cpu, memory, load }
    }

    /// Number of ticks (length of the shortest series).
    pub fn len(&self) -> usize {
        self.cpu.len().min(self.memory.len()).min(self.load.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether all three series have the same length.
    pub fn is_aligned(&self) -> bool {
        self.cpu.len() == self.memory.len() && self.memory.len() == self.load.len()
    }

    /// Measurement vector `z` for tick `i`.
    pub fn measurement(&self, i: usize) -> Measurement {
        Measurement::new(self.cpu[i], self.memory[i], self.load[i])
    }
}

pub struct Preprocessor {
    settings: PreprocessConfig,
}

impl Preprocessor {
    pub fn new(settings: PreprocessConfig) -> Self {
        Self { settings }
    }

    /// Replace missing entries.
    ///
    /// Below the missing-value threshold gaps are forward-filled, with leading
    /// gaps taking the first valid value; otherwise every gap takes the mean
    /// of the valid entries. A series with no valid entry becomes all zeros.
    pub fn fill_missing(&self, series: &[f64]) -> Vec<f64> {
        let missing = series.iter().filter(|v| !v.is_finite()).count();
        if missing == 0 {
            return series.to_vec();
        }
        if missing == series.len() {
            warn!("series of {} values has no valid entry, filling with 0.0", series.len());
            return vec![0.0; series.len()];
        }

        let fraction = missing as f64 / series.len() as f64;
        if fraction < self.settings.missing_value_threshold {
            let mut last = series
                .iter()
                .copied()
                .find(|v| v.is_finite())
                .unwrap_or_default();
            series
                .iter()
                .map(|&v| {
                    if v.is_finite() {
                        last = v;
                    }
                    last
                })
                .collect()
        } else {
            let valid = series.len() - missing;
            let mean = series.iter().filter(|v| v.is_finite()).sum::<f64>() / valid as f64;
            series
                .iter()
                .map(|&v| if v.is_finite() { v } else { mean })
                .collect()
        }
    }

    /// Clip to `mean ± outlier_threshold · std` (population statistics).
    pub fn cap_outliers(&self, series: &[f64]) -> Vec<f64> {
        if series.is_empty() {
            return Vec::new();
        }
        let (lower, upper) = outlier_bounds(series, self.settings.outlier_threshold);
        series.iter().map(|v| v.max(lower).min(upper)).collect()
    }

    /// Fill, cap and clamp every feature of a batch.
    pub fn prepare(&self, batch: ObservationBatch) -> ObservationBatch {
        let clean = |series: &[f64], hi: f64| -> Vec<f64> {
            self.cap_outliers(&self.fill_missing(series))
                .into_iter()
                .map(|v| v.clamp(0.0, hi))
                .collect()
        };
        ObservationBatch {
            cpu: clean(&batch.cpu, 1.0),
            memory: clean(&batch.memory, 1.0),
            load: clean(&batch.load, self.settings.load_average_ceiling),
        }
    }
}

/// `(mean - k·std, mean + k·std)` over the whole series.
pub fn outlier_bounds(series: &[f64], k: f64) -> (f64, f64) {
    let n = series.len() as f64;
    let mean = series.iter().sum::<f64>() / n;
    let std = (series.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    (mean - k * std, mean + k * std)
}

/// Heuristic context-switch rate: high load combined with a moving CPU trend
/// suggests contention. A proxy, not a measurement.
pub fn estimate_context_switches(cpu_trend: f64, load_average: f64) -> f64 {
    (cpu_trend.abs() * load_average * 0.1).clamp(0.0, 1.0)
}

mod defaults;


use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::KestrelError;
use defaults::*;

/// Top-level Kestrel configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub adaptation: AdaptationConfig,
    #[serde(default)]
    pub preprocess: PreprocessConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub boundary: BoundaryConfig,
    #[serde(default)]
    pub model: ModelConfig,
}

/// Identity reported by the metadata query, plus logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            version: default_version(),
            log_level: default_log_level(),
        }
    }
}

/// Covariance bounds and the variance-explosion reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Lower bound for every entry and eigenvalue of `P`, and every entry of `R`.
    #[serde(default = "default_min_variance")]
    pub min_variance: f64,
    #[serde(default = "default_max_variance")]
    pub max_variance: f64,
    /// `P[0,0]` above this resets `P` to the initial covariance.
    #[serde(default = "default_variance_reset_threshold")]
    pub variance_reset_threshold: f64,
    /// Diagonal of the initial (and reset) state covariance.
    #[serde(default = "default_initial_variance")]
    pub initial_variance: f64,
    #[serde(default = "default_min_process_noise")]
    pub min_process_noise: f64,
    #[serde(default = "default_max_process_noise")]
    pub max_process_noise: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_variance: default_min_variance(),
            max_variance: default_max_variance(),
            variance_reset_threshold: default_variance_reset_threshold(),
            initial_variance: default_initial_variance(),
            min_process_noise: default_min_process_noise(),
            max_process_noise: default_max_process_noise(),
        }
    }
}

/// Online noise adaptation driven by the innovation window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,
    /// Adapt on every observation count divisible by this.
    #[serde(default = "default_adaptation_interval")]
    pub interval: u64,
    /// Window length required before the first adaptation.
    #[serde(default = "default_min_observations")]
    pub min_observations: usize,
    /// Blend weight of the empirical innovation covariance into `R`.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_high_error_threshold")]
    pub high_error_threshold: f64,
    #[serde(default = "default_low_error_threshold")]
    pub low_error_threshold: f64,
    #[serde(default = "default_growth_factor")]
    pub growth_factor: f64,
    #[serde(default = "default_shrink_factor")]
    pub shrink_factor: f64,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_capacity: default_window_capacity(),
            interval: default_adaptation_interval(),
            min_observations: default_min_observations(),
            learning_rate: default_learning_rate(),
            high_error_threshold: default_high_error_threshold(),
            low_error_threshold: default_low_error_threshold(),
            growth_factor: default_growth_factor(),
            shrink_factor: default_shrink_factor(),
        }
    }
}

/// Missing-value and outlier handling for raw observation batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Below this missing fraction gaps are forward-filled, otherwise mean-filled.
    #[serde(default = "default_missing_value_threshold")]
    pub missing_value_threshold: f64,
    /// Outliers are capped at `mean ± outlier_threshold · std`.
    #[serde(default = "default_outlier_threshold")]
    pub outlier_threshold: f64,
    #[serde(default = "default_load_average_ceiling")]
    pub load_average_ceiling: f64,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            missing_value_threshold: default_missing_value_threshold(),
            outlier_threshold: default_outlier_threshold(),
            load_average_ceiling: default_load_average_ceiling(),
        }
    }
}

/// How the three input series map onto the `(cpu, memory, load)` observation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeatureMode {
    /// Inputs: memory, 15m load, 1m load. CPU is derived from the 1m load.
    #[default]
    LoadDerived,
    /// Inputs: cpu, memory, 1m load.
    Direct,
}

/// Feature adaptation at the inference boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    #[serde(default)]
    pub mode: FeatureMode,
    /// Normalization baseline for load-derived CPU (`load_1m / cpu_cores`).
    #[serde(default = "default_cpu_cores")]
    pub cpu_cores: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            mode: FeatureMode::default(),
            cpu_cores: default_cpu_cores(),
        }
    }
}

/// Request queue in front of the estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundaryConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Optional overrides of the dynamics. Rows are checked at model construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    /// 5×5 state transition rows.
    #[serde(default)]
    pub transition: Option<Vec<Vec<f64>>>,
    /// 3×5 measurement rows.
    #[serde(default)]
    pub measurement: Option<Vec<Vec<f64>>>,
}

impl Config {
    /// Check bounds and cadence settings for consistency.
    pub fn validate(&self) -> Result<(), KestrelError> {
        let f = &self.filter;
        if !(f.min_variance > 0.0 && f.min_variance < f.max_variance) {
            return Err(KestrelError::Configuration(format!(
                "filter.min_variance ({}) must be positive and below max_variance ({})",
                f.min_variance, f.max_variance
            )));
        }
        if !(f.min_process_noise > 0.0 && f.min_process_noise < f.max_process_noise) {
            return Err(KestrelError::Configuration(format!(
                "filter.min_process_noise ({}) must be positive and below max_process_noise ({})",
                f.min_process_noise, f.max_process_noise
            )));
        }
        if !(f.initial_variance >= f.min_variance && f.initial_variance <= f.max_variance) {
            return Err(KestrelError::Configuration(format!(
                "filter.initial_variance ({}) must lie in [{}, {}]",
                f.initial_variance, f.min_variance, f.max_variance
            )));
        }
        if f.variance_reset_threshold <= f.initial_variance {
            return Err(KestrelError::Configuration(format!(
                "filter.variance_reset_threshold ({}) must exceed initial_variance ({})",
                f.variance_reset_threshold, f.initial_variance
            )));
        }

        let a = &self.adaptation;
        if a.interval == 0 {
            return Err(KestrelError::Configuration(
                "adaptation.interval must be at least 1".into(),
            ));
        }
        if a.min_observations < 2 || a.window_capacity < a.min_observations {
            return Err(KestrelError::Configuration(format!(
                "adaptation.window_capacity ({}) must hold min_observations ({}), which must be at least 2",
                a.window_capacity, a.min_observations
            )));
        }
        if !(0.0..=1.0).contains(&a.learning_rate) {
            return Err(KestrelError::Configuration(format!(
                "adaptation.learning_rate ({}) must lie in [0, 1]",
                a.learning_rate
            )));
        }
        if a.growth_factor <= 0.0 || a.shrink_factor <= 0.0 {
            return Err(KestrelError::Configuration(
                "adaptation growth/shrink factors must be positive".into(),
            ));
        }
        if a.low_error_threshold > a.high_error_threshold {
            return Err(KestrelError::Configuration(format!(
                "adaptation.low_error_threshold ({}) exceeds high_error_threshold ({})",
                a.low_error_threshold, a.high_error_threshold
            )));
        }

        let p = &self.preprocess;
        if !(0.0..=1.0).contains(&p.missing_value_threshold) {
            return Err(KestrelError::Configuration(format!(
                "preprocess.missing_value_threshold ({}) must lie in [0, 1]",
                p.missing_value_threshold
            )));
        }
        if p.outlier_threshold <= 0.0 || p.load_average_ceiling <= 0.0 {
            return Err(KestrelError::Configuration(
                "preprocess.outlier_threshold and load_average_ceiling must be positive".into(),
            ));
        }

        if !(self.features.cpu_cores.is_finite() && self.features.cpu_cores > 0.0) {
            return Err(KestrelError::Configuration(format!(
                "features.cpu_cores ({}) must be a positive number",
                self.features.cpu_cores
            )));
        }
        if self.boundary.queue_capacity == 0 {
            return Err(KestrelError::Configuration(
                "boundary.queue_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist.
pub fn load(path: &str) -> Result<Config, KestrelError> {
    let path = Path::new(path);
    if !path.exists() {
        info!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        KestrelError::Configuration(format!("failed to read {}: {}", path.display(), e))
    })?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| KestrelError::Configuration(format!("failed to parse config: {}", e)))?;

    config.validate()?;
    Ok(config)
}

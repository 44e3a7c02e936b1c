//! Feature adaptation at the inference boundary.
//!
//! Collectors do not always export CPU utilization. An adapter maps the three
//! raw input series, in metadata order, onto the `(cpu, memory, load)`
//! observation triple the estimator consumes.

use kestrel_core::config::{FeatureConfig, FeatureMode};

use crate::preprocess::ObservationBatch;

/// Maps three raw input series onto an observation batch.
pub trait FeatureAdapter: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Expected input names, in order.
    fn input_names(&self) -> [&'static str; 3];

    /// Build the observation batch. Missing values stay NaN.
    fn adapt(&self, inputs: [Vec<f64>; 3]) -> ObservationBatch;
}

/// CPU, memory and 1m load average are all supplied.
pub struct DirectCpu;

impl FeatureAdapter for DirectCpu {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn input_names(&self) -> [&'static str; 3] {
        ["cpu_utilization", "memory_utilization", "load_average_1m"]
    }

    fn adapt(&self, inputs: [Vec<f64>; 3]) -> ObservationBatch {
        let [cpu, memory, load] = inputs;
        ObservationBatch::new(cpu, memory, load)
    }
}

/// CPU derived from the 1m load average over a fixed core count; the 15m
/// load average is the load feature.
pub struct LoadDerivedCpu {
    cpu_cores: f64,
}

impl LoadDerivedCpu {
    pub fn new(cpu_cores: f64) -> Self {
        Self { cpu_cores }
    }
}

impl FeatureAdapter for LoadDerivedCpu {
    fn name(&self) -> &'static str {
        "load-derived"
    }

    fn input_names(&self) -> [&'static str; 3] {
        ["memory_utilization", "load_average_15m", "load_average_1m"]
    }

    fn adapt(&self, inputs: [Vec<f64>; 3]) -> ObservationBatch {
        let [memory, load_15m, load_1m] = inputs;
        // NaN passes through clamp, so gaps survive for the preprocessor.
        let cpu = load_1m
            .iter()
            .map(|l| (l / self.cpu_cores).clamp(0.0, 1.0))
            .collect();
        ObservationBatch::new(cpu, memory, load_15m)
    }
}

/// Adapter selected by configuration.
pub fn from_config(cfg: &FeatureConfig) -> Box<dyn FeatureAdapter> {
    match cfg.mode {
        FeatureMode::Direct => Box::new(DirectCpu),
        FeatureMode::LoadDerived => Box::new(LoadDerivedCpu::new(cfg.cpu_cores)),
    }
}

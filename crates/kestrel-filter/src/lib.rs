//! # kestrel-filter
//!
//! Adaptive 5-state Kalman estimator for CPU utilization. Tracks CPU level,
//! CPU trend, memory, load average and context-switch rate from noisy
//! `(cpu, memory, load)` observations, keeps its covariances well-conditioned,
//! adapts its noise model from the innovation sequence, and serves
//! per-tick forecasts through a batch inference boundary.

pub mod adaptive;
pub mod estimator;
pub mod features;
pub mod guard;
pub mod inference;
pub mod metadata;
pub mod model;
pub mod preprocess;
pub mod signal;

use kestrel_core::config::Config;
use kestrel_core::error::KestrelError;
use tracing::debug;

use adaptive::AdaptiveNoiseController;
use estimator::KalmanEstimator;
use model::{LinearGaussianModel, Measurement};
use preprocess::{ObservationBatch, Preprocessor};
use signal::{ForecastSeries, TickEstimate};

/// Orchestrates one estimator, its noise controller and the preprocessor.
pub struct CpuForecaster {
    estimator: KalmanEstimator,
    adaptation: AdaptiveNoiseController,
    preprocessor: Preprocessor,
}

impl CpuForecaster {
    /// Validate the configuration, build the model and initialize the
    /// estimator.
    pub fn new(config: &Config) -> Result<Self, KestrelError> {
        config.validate()?;
        let model = LinearGaussianModel::from_config(&config.model)?;
        let mut estimator = KalmanEstimator::new(model, config.filter.clone());
        estimator.initialize();
        Ok(Self {
            estimator,
            adaptation: AdaptiveNoiseController::new(config.adaptation.clone()),
            preprocessor: Preprocessor::new(config.preprocess.clone()),
        })
    }

    /// One full tick: predict, update, record the innovation, maybe adapt.
    ///
    /// A non-finite measurement is rejected before the predict step, so the
    /// estimator is left untouched.
    pub fn process_tick(&mut self, z: &Measurement) -> Result<TickEstimate, KestrelError> {
        estimator::check_measurement(z)?;
        self.estimator.predict()?;
        let tick = self.estimator.update(z)?;
        if let Some(y) = self.estimator.last_innovation() {
            self.adaptation.record(y);
        }
        let count = self.estimator.observation_count();
        if self.adaptation.maybe_adapt(count, &mut self.estimator) {
            debug!("noise model adapted at tick {count}");
        }
        Ok(tick)
    }

    /// Preprocess a batch, then run every tick in order. The three series must
    /// have equal length.
    pub fn process_batch(&mut self, batch: ObservationBatch) -> Result<ForecastSeries, KestrelError> {
        if !batch.is_aligned() {
            return Err(KestrelError::InputShape(format!(
                "series lengths differ: cpu {} / memory {} / load {}",
                batch.cpu.len(),
                batch.memory.len(),
                batch.load.len()
            )));
        }
        let prepared = self.preprocessor.prepare(batch);
        let mut series = ForecastSeries::with_capacity(prepared.len());
        for i in 0..prepared.len() {
            let tick = self.process_tick(&prepared.measurement(i))?;
            series.push(&tick);
        }
        Ok(series)
    }

    pub fn estimator(&self) -> &KalmanEstimator {
        &self.estimator
    }

    pub fn adaptation(&self) -> &AdaptiveNoiseController {
        &self.adaptation
    }
}

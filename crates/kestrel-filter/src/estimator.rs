//! Linear-Gaussian state estimator for CPU utilization.
//!
//! Five-dimensional state, three-dimensional observation. After each
//! correction the state covariance is reset if it has exploded, clipped,
//! symmetrized and eigenvalue-floored, so that the reported variance and
//! confidence stay bounded whatever the input stream does.

use kestrel_core::config::FilterConfig;
use kestrel_core::error::KestrelError;
use nalgebra::SVD;
use tracing::warn;

use crate::guard;
use crate::model::{
    LinearGaussianModel, Measurement, NoiseMatrix, StateMatrix, StateVector, OBS_DIM, STATE_DIM,
};
use crate::preprocess::estimate_context_switches;
use crate::signal::TickEstimate;

/// Seed state: 30% CPU, flat trend, 50% memory, load 1.0, no contention.
const INITIAL_STATE: [f64; STATE_DIM] = [0.3, 0.0, 0.5, 1.0, 0.0];
/// Seed process noise diagonal. The trend moves slowly, context switches fast.
const PROCESS_NOISE: [f64; STATE_DIM] = [0.01, 0.001, 0.01, 0.01, 0.1];
/// Seed measurement noise diagonal for CPU, memory, load average.
const MEASUREMENT_NOISE: [f64; OBS_DIM] = [0.02, 0.03, 0.1];

const CONFIDENCE_VARIANCE_WEIGHT: f64 = 0.1;
const CONFIDENCE_INNOVATION_WEIGHT: f64 = 0.1;
/// Singular values below this are dropped by the pseudo-inverse.
const PINV_EPS: f64 = 1e-12;
const SVD_MAX_ITER: usize = 200;

/// Mutable filter state; exists only once the estimator is initialized.
#[derive(Debug, Clone)]
struct FilterState {
    x: StateVector,
    p: StateMatrix,
    q: StateMatrix,
    r: NoiseMatrix,
    last_innovation: Option<Measurement>,
    observation_count: u64,
}

/// Adaptive Kalman estimator over the fixed CPU/memory/load model.
pub struct KalmanEstimator {
    model: LinearGaussianModel,
    settings: FilterConfig,
    state: Option<FilterState>,
}

impl KalmanEstimator {
    /// Create an uninitialized estimator. Call [`initialize`](Self::initialize)
    /// before any other operation.
    pub fn new(model: LinearGaussianModel, settings: FilterConfig) -> Self {
        Self {
            model,
            settings,
            state: None,
        }
    }

    /// Set state, covariance and noise to their seed values. Calling it again
    /// starts over.
    pub fn initialize(&mut self) {
        let (min_q, max_q) = (self.settings.min_process_noise, self.settings.max_process_noise);
        self.state = Some(FilterState {
            x: StateVector::from_column_slice(&INITIAL_STATE),
            p: self.initial_covariance(),
            q: StateMatrix::from_diagonal(&StateVector::from_fn(|i, _| {
                PROCESS_NOISE[i].max(min_q).min(max_q)
            })),
            r: NoiseMatrix::from_diagonal(&Measurement::from_column_slice(&MEASUREMENT_NOISE)),
            last_innovation: None,
            observation_count: 0,
        });
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// `initial_variance · I`, used at start-up and on variance resets.
    pub fn initial_covariance(&self) -> StateMatrix {
        StateMatrix::identity() * self.settings.initial_variance
    }

    pub fn settings(&self) -> &FilterConfig {
        &self.settings
    }

    pub fn model(&self) -> &LinearGaussianModel {
        &self.model
    }

    /// Time update: `x ← F x`, `P ← F P Fᵀ + Q`.
    pub fn predict(&mut self) -> Result<(), KestrelError> {
        let f = self.model.transition();
        let st = self
            .state
            .as_mut()
            .ok_or(KestrelError::UninitializedEstimator)?;
        st.x = f * st.x;
        st.p = f * st.p * f.transpose() + st.q;
        Ok(())
    }

    /// Measurement update followed by covariance hardening.
    ///
    /// A non-finite measurement is rejected before any state changes. An
    /// innovation covariance that cannot be inverted, or a posterior state
    /// that is not finite, skips the correction and keeps the prior.
    pub fn update(&mut self, z: &Measurement) -> Result<TickEstimate, KestrelError> {
        check_measurement(z)?;
        let initial_covariance = self.initial_covariance();
        let settings = &self.settings;
        let h = self.model.measurement();
        let st = self
            .state
            .as_mut()
            .ok_or(KestrelError::UninitializedEstimator)?;

        let y = z - h * st.x;
        let s = h * st.p * h.transpose() + st.r;
        match invert_innovation_covariance(&s) {
            Some(s_inv) => {
                let k = st.p * h.transpose() * s_inv;
                let x_post = st.x + k * y;
                if x_post.iter().all(|v| v.is_finite()) {
                    st.x = x_post;
                    st.p = (StateMatrix::identity() - k * h) * st.p;
                } else {
                    warn!("kalman: non-finite posterior state, correction skipped");
                }
            }
            None => warn!("kalman: innovation covariance not invertible, correction skipped"),
        }

        let p00 = st.p[(0, 0)];
        let variance_reset =
            st.p.iter().any(|v| !v.is_finite()) || p00 > settings.variance_reset_threshold;
        if variance_reset {
            warn!(
                "kalman: variance {p00:.4} above {} or non-finite, resetting covariance",
                settings.variance_reset_threshold
            );
            st.p = initial_covariance;
        }
        st.p = guard::harden(&st.p, settings.min_variance, settings.max_variance);

        st.x[4] = estimate_context_switches(st.x[1], z[2]);
        st.observation_count += 1;
        st.last_innovation = Some(y);

        let prediction_variance = if variance_reset {
            settings.initial_variance
        } else {
            st.p[(0, 0)]
                .max(settings.min_variance)
                .min(settings.max_variance)
        };
        let innovation_magnitude = y.norm();
        let mean_variance = st.p.trace() / STATE_DIM as f64;
        let confidence = (1.0
            / (1.0
                + CONFIDENCE_VARIANCE_WEIGHT * mean_variance
                + CONFIDENCE_INNOVATION_WEIGHT * innovation_magnitude))
            .clamp(0.0, 1.0);

        Ok(TickEstimate {
            predicted_cpu: st.x[0].clamp(0.0, 1.0),
            prediction_variance,
            innovation_magnitude,
            cpu_trend: st.x[1],
            confidence,
            variance_reset,
        })
    }

    pub fn state(&self) -> Result<&StateVector, KestrelError> {
        Ok(&self.filter_state()?.x)
    }

    pub fn covariance(&self) -> Result<&StateMatrix, KestrelError> {
        Ok(&self.filter_state()?.p)
    }

    pub fn process_noise(&self) -> Result<&StateMatrix, KestrelError> {
        Ok(&self.filter_state()?.q)
    }

    pub fn measurement_noise(&self) -> Result<&NoiseMatrix, KestrelError> {
        Ok(&self.filter_state()?.r)
    }

    /// Innovation of the most recent update; `None` on a fresh estimator.
    pub fn last_innovation(&self) -> Option<Measurement> {
        self.state.as_ref().and_then(|st| st.last_innovation)
    }

    /// Completed updates since initialization.
    pub fn observation_count(&self) -> u64 {
        self.state.as_ref().map_or(0, |st| st.observation_count)
    }

    /// Replace the noise covariances.
    pub fn set_noise(&mut self, q: StateMatrix, r: NoiseMatrix) -> Result<(), KestrelError> {
        let st = self
            .state
            .as_mut()
            .ok_or(KestrelError::UninitializedEstimator)?;
        st.q = q;
        st.r = r;
        Ok(())
    }

    #[cfg(test)]
    fn force_covariance(&mut self, p: StateMatrix) {
        if let Some(st) = self.state.as_mut() {
            st.p = p;
        }
    }

    fn filter_state(&self) -> Result<&FilterState, KestrelError> {
        self.state
            .as_ref()
            .ok_or(KestrelError::UninitializedEstimator)
    }
}

/// Reject measurements the filter cannot absorb.
pub fn check_measurement(z: &Measurement) -> Result<(), KestrelError> {
    if z.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(KestrelError::NumericalInstability(format!(
            "non-finite measurement {:?}",
            z.as_slice()
        )))
    }
}

/// `S⁻¹` via Cholesky, falling back to the SVD pseudo-inverse when `S` is
/// not positive definite. `None` when `S` is non-finite or both fail.
fn invert_innovation_covariance(s: &NoiseMatrix) -> Option<NoiseMatrix> {
    if s.iter().any(|v| !v.is_finite()) {
        return None;
    }
    if let Some(chol) = s.cholesky() {
        let inv = chol.inverse();
        if inv.iter().all(|v| v.is_finite()) {
            return Some(inv);
        }
    }
    let svd = SVD::try_new(*s, true, true, PINV_EPS, SVD_MAX_ITER)?;
    svd.pseudo_inverse(PINV_EPS)
        .ok()
        .filter(|inv| inv.iter().all(|v| v.is_finite()))
}

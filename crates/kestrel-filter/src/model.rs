//! Fixed linear-Gaussian dynamics for the CPU estimator.
//!
//! State is `[cpu_usage, cpu_trend, memory_usage, load_average,
//! context_switches]`; the observation is `[cpu, memory, load_average]`.

use kestrel_core::config::ModelConfig;
use kestrel_core::error::KestrelError;
use nalgebra::{SMatrix, SVector};

pub const STATE_DIM: usize = 5;
pub const OBS_DIM: usize = 3;

pub type StateVector = SVector<f64, STATE_DIM>;
pub type StateMatrix = SMatrix<f64, STATE_DIM, STATE_DIM>;
pub type Measurement = SVector<f64, OBS_DIM>;
pub type MeasurementMatrix = SMatrix<f64, OBS_DIM, STATE_DIM>;
pub type NoiseMatrix = SMatrix<f64, OBS_DIM, OBS_DIM>;

/// State transition with cross effects: memory pressure feeds CPU, load
/// persists, context switches track contention.
const TRANSITION: [[f64; STATE_DIM]; STATE_DIM] = [
    [1.0, 1.0, 0.1, 0.05, 0.03],
    [0.0, 0.95, 0.05, 0.02, 0.01],
    [0.2, 0.0, 0.95, 0.1, 0.05],
    [0.15, 0.05, 0.1, 0.9, 0.1],
    [0.1, 0.02, 0.05, 0.15, 0.92],
];

/// CPU is observed indirectly (mixed with trend and load); memory and load
/// average directly.
const MEASUREMENT: [[f64; STATE_DIM]; OBS_DIM] = [
    [0.8, 0.1, 0.0, 0.1, 0.0],
    [0.0, 0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, 1.0, 0.0],
];

/// Immutable `F` and `H` matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearGaussianModel {
    transition: StateMatrix,
    measurement: MeasurementMatrix,
}

impl LinearGaussianModel {
    /// The built-in CPU/memory/load dynamics.
    pub fn standard() -> Self {
        Self {
            transition: StateMatrix::from_fn(|r, c| TRANSITION[r][c]),
            measurement: MeasurementMatrix::from_fn(|r, c| MEASUREMENT[r][c]),
        }
    }

    /// Build from row vectors, failing unless they are 5×5 and 3×5 and finite.
    pub fn from_rows(
        transition: &[Vec<f64>],
        measurement: &[Vec<f64>],
    ) -> Result<Self, KestrelError> {
        Ok(Self {
            transition: matrix_from_rows(transition, "transition")?,
            measurement: matrix_from_rows(measurement, "measurement")?,
        })
    }

    /// Standard model with any configured overrides applied.
    pub fn from_config(cfg: &ModelConfig) -> Result<Self, KestrelError> {
        let mut model = Self::standard();
        if let Some(rows) = &cfg.transition {
            model.transition = matrix_from_rows(rows, "transition")?;
        }
        if let Some(rows) = &cfg.measurement {
            model.measurement = matrix_from_rows(rows, "measurement")?;
        }
        Ok(model)
    }

    pub fn transition(&self) -> &StateMatrix {
        &self.transition
    }

    pub fn measurement(&self) -> &MeasurementMatrix {
        &self.measurement
    }
}

impl Default for LinearGaussianModel {
    fn default() -> Self {
        Self::standard()
    }
}

fn matrix_from_rows<const R: usize, const C: usize>(
    rows: &[Vec<f64>],
    label: &str,
) -> Result<SMatrix<f64, R, C>, KestrelError> {
    if rows.len() != R {
        return Err(KestrelError::Configuration(format!(
            "{label} matrix must have {R} rows, got {}",
            rows.len()
        )));
    }
    for (i, row) in rows.iter().enumerate() {
        if row.len() != C {
            return Err(KestrelError::Configuration(format!(
                "{label} matrix row {i} must have {C} columns, got {}",
                row.len()
            )));
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(KestrelError::Configuration(format!(
                "{label} matrix row {i} contains a non-finite value"
            )));
        }
    }
    Ok(SMatrix::from_fn(|r, c| rows[r][c]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows<const R: usize, const C: usize>(m: [[f64; C]; R]) -> Vec<Vec<f64>> {
        m.iter().map(|r| r.to_vec()).collect()
    }

    #[test]
    fn test_standard_cross_correlations() {
        let model = LinearGaussianModel::standard();
        let f = model.transition();
        assert_eq!(f[(0, 1)], 1.0, "CPU integrates its trend");
        assert_eq!(f[(0, 2)], 0.1, "memory affects CPU");
        assert_eq!(f[(0, 3)], 0.05, "load affects CPU");
        assert_eq!(f[(2, 0)], 0.2, "CPU affects memory");

        let h = model.measurement();
        assert_eq!(h[(0, 0)], 0.8);
        assert_eq!(h[(1, 2)], 1.0);
        assert_eq!(h[(2, 3)], 1.0);
        assert_eq!(h[(0, 4)], 0.0, "context switches are unobserved");
    }

    #[test]
    fn test_from_rows_roundtrips_standard() {
        let model =
            LinearGaussianModel::from_rows(&rows(TRANSITION), &rows(MEASUREMENT)).unwrap();
        assert_eq!(model, LinearGaussianModel::standard());
    }

    #[test]
    fn test_from_rows_rejects_wrong_shapes() {
        let short = rows(TRANSITION)[..4].to_vec();
        let err = LinearGaussianModel::from_rows(&short, &rows(MEASUREMENT)).unwrap_err();
        assert!(matches!(err, KestrelError::Configuration(_)));
        assert!(err.to_string().contains("5 rows"));

        let mut narrow = rows(MEASUREMENT);
        narrow[1].pop();
        let err = LinearGaussianModel::from_rows(&rows(TRANSITION), &narrow).unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn test_from_rows_rejects_non_finite() {
        let mut bad = rows(TRANSITION);
        bad[2][2] = f64::NAN;
        assert!(LinearGaussianModel::from_rows(&bad, &rows(MEASUREMENT)).is_err());
    }

    #[test]
    fn test_from_config_applies_override() {
        let cfg = ModelConfig {
            transition: None,
            measurement: Some(rows([
                [1.0, 0.0, 0.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 0.0, 1.0, 0.0],
            ])),
        };
        let model = LinearGaussianModel::from_config(&cfg).unwrap();
        assert_eq!(model.measurement()[(0, 0)], 1.0);
        assert_eq!(model.transition(), LinearGaussianModel::standard().transition());
    }
}

//! Numeric safeguards for covariance-like matrices.
//!
//! Pure functions over fixed-size square matrices: symmetrization,
//! elementwise clipping and eigenvalue flooring. Used on the state
//! covariance after every update and on the noise covariances after every
//! adaptation.

use nalgebra::{DMatrix, SMatrix, SymmetricEigen};

/// Convergence tolerance for the symmetric eigendecomposition.
const EIGEN_EPS: f64 = f64::EPSILON;
/// Iteration cap so that a pathological input cannot spin forever.
const EIGEN_MAX_ITER: usize = 500;

/// `(M + Mᵀ) / 2`.
pub fn symmetrize<const D: usize>(m: &SMatrix<f64, D, D>) -> SMatrix<f64, D, D> {
    (m + m.transpose()) * 0.5
}

/// Elementwise clamp to `[lo, hi]`.
pub fn clip_values<const D: usize>(
    m: &SMatrix<f64, D, D>,
    lo: f64,
    hi: f64,
) -> SMatrix<f64, D, D> {
    m.map(|v| v.max(lo).min(hi))
}

/// Clamp the eigenvalues of a symmetric matrix to `[floor, ceiling]` and
/// rebuild it as `V diag(λ') Vᵀ`.
///
/// Pass `f64::INFINITY` as `ceiling` for a floor only. The result is
/// symmetric with every eigenvalue at least `floor`. Non-finite input, or a
/// decomposition that fails to converge, degrades to the diagonal clamped to
/// the same bounds.
pub fn floor_eigenvalues<const D: usize>(
    m: &SMatrix<f64, D, D>,
    floor: f64,
    ceiling: f64,
) -> SMatrix<f64, D, D> {
    if m.iter().any(|v| !v.is_finite()) {
        return clamped_diagonal(m, floor, ceiling);
    }

    let dynamic = DMatrix::from_column_slice(D, D, symmetrize(m).as_slice());
    let Some(mut eigen) = SymmetricEigen::try_new(dynamic, EIGEN_EPS, EIGEN_MAX_ITER) else {
        return clamped_diagonal(m, floor, ceiling);
    };
    for lambda in eigen.eigenvalues.iter_mut() {
        *lambda = lambda.max(floor).min(ceiling);
    }
    let rebuilt = eigen.recompose();
    symmetrize(&SMatrix::from_column_slice(rebuilt.as_slice()))
}

/// Smallest eigenvalue of a symmetric matrix.
pub fn min_eigenvalue<const D: usize>(m: &SMatrix<f64, D, D>) -> f64 {
    let dynamic = DMatrix::from_column_slice(D, D, symmetrize(m).as_slice());
    dynamic
        .symmetric_eigenvalues()
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min)
}

/// Noise-covariance sanitization: symmetrize, floor eigenvalues, then clip.
pub fn sanitize<const D: usize>(m: &SMatrix<f64, D, D>, lo: f64, hi: f64) -> SMatrix<f64, D, D> {
    clip_values(&floor_eigenvalues(&symmetrize(m), lo, hi), lo, hi)
}

/// State-covariance hardening: clip, symmetrize, then floor eigenvalues.
pub fn harden<const D: usize>(m: &SMatrix<f64, D, D>, lo: f64, hi: f64) -> SMatrix<f64, D, D> {
    floor_eigenvalues(&symmetrize(&clip_values(m, lo, hi)), lo, hi)
}

/// Largest absolute difference between `M` and `Mᵀ`.
pub fn asymmetry<const D: usize>(m: &SMatrix<f64, D, D>) -> f64 {
    (m - m.transpose()).amax()
}

fn clamped_diagonal<const D: usize>(
    m: &SMatrix<f64, D, D>,
    floor: f64,
    ceiling: f64,
) -> SMatrix<f64, D, D> {
    SMatrix::from_fn(|r, c| {
        if r != c {
            return 0.0;
        }
        let v = m[(r, c)];
        if v.is_finite() {
            v.max(floor).min(ceiling)
        } else {
            floor
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix3, Matrix5};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_matrix(rng: &mut StdRng, scale: f64) -> Matrix5<f64> {
        Matrix5::from_fn(|_, _| rng.gen_range(-scale..scale))
    }

    #[test]
    fn test_symmetrize_averages_off_diagonal() {
        let m = Matrix3::new(1.0, 2.0, 0.0, 4.0, 5.0, 6.0, 0.0, 0.0, 9.0);
        let s = symmetrize(&m);
        assert_eq!(s[(0, 1)], 3.0);
        assert_eq!(s[(1, 0)], 3.0);
        assert_eq!(s[(1, 2)], 3.0);
        assert_eq!(s[(0, 0)], 1.0);
        assert_eq!(asymmetry(&s), 0.0);
    }

    #[test]
    fn test_clip_values_bounds_every_entry() {
        let m = Matrix3::new(-1.0, 0.5, 20.0, 0.5, 0.0, 3.0, 20.0, 3.0, 1e-9);
        let c = clip_values(&m, 1e-4, 10.0);
        assert!(c.iter().all(|&v| (1e-4..=10.0).contains(&v)));
        assert_eq!(c[(0, 1)], 0.5);
        assert_eq!(c[(0, 2)], 10.0);
    }

    #[test]
    fn test_floor_eigenvalues_lifts_indefinite_matrix() {
        let m = Matrix3::new(1.0, 2.0, 0.0, 2.0, 1.0, 0.0, 0.0, 0.0, -3.0);
        assert!(min_eigenvalue(&m) < 0.0);
        let floored = floor_eigenvalues(&m, 0.01, f64::INFINITY);
        assert!(min_eigenvalue(&floored) >= 0.01 - 1e-12);
        assert!(asymmetry(&floored) < 1e-12);
    }

    #[test]
    fn test_floor_eigenvalues_respects_ceiling() {
        let m = Matrix3::from_diagonal(&nalgebra::Vector3::new(50.0, 1.0, 1e-8));
        let floored = floor_eigenvalues(&m, 1e-4, 10.0);
        assert!((floored[(0, 0)] - 10.0).abs() < 1e-9);
        assert!((floored[(1, 1)] - 1.0).abs() < 1e-9);
        assert!((floored[(2, 2)] - 1e-4).abs() < 1e-9);
    }

    #[test]
    fn test_floor_eigenvalues_leaves_well_conditioned_matrix() {
        let m = Matrix5::identity() * 0.5 + Matrix5::from_element(0.01);
        let floored = floor_eigenvalues(&m, 1e-4, 10.0);
        assert!((floored - m).amax() < 1e-10);
    }

    #[test]
    fn test_floor_eigenvalues_idempotent() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let m = random_matrix(&mut rng, 5.0);
            let once = floor_eigenvalues(&m, 1e-4, 10.0);
            let twice = floor_eigenvalues(&once, 1e-4, 10.0);
            assert!(
                (once - twice).amax() < 1e-9,
                "floor_eigenvalues should be idempotent, diff {}",
                (once - twice).amax()
            );
        }
    }

    #[test]
    fn test_floor_eigenvalues_non_finite_falls_back_to_diagonal() {
        let mut m = Matrix3::identity() * 2.0;
        m[(0, 1)] = f64::NAN;
        let floored = floor_eigenvalues(&m, 0.1, 10.0);
        assert!(floored.iter().all(|v| v.is_finite()));
        assert_eq!(floored[(0, 1)], 0.0);
        assert_eq!(floored[(1, 1)], 2.0);
    }

    #[test]
    fn test_harden_random_matrices() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let m = random_matrix(&mut rng, 50.0);
            let h = harden(&m, 1e-4, 10.0);
            assert!(asymmetry(&h) < 1e-12);
            assert!(min_eigenvalue(&h) >= 1e-4 - 1e-9);
            assert!(h.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_sanitize_keeps_entries_in_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            let m = random_matrix(&mut rng, 1.0);
            let s = sanitize(&m, 1e-6, 0.1);
            assert!(s.iter().all(|&v| (1e-6..=0.1).contains(&v)));
            assert!(asymmetry(&s) < 1e-12);
        }
    }
}

//! Covariance-weighted least-squares fit of a single-predictor linear model.

use crate::types::{RateError, RateResult};
use nalgebra::{DMatrix, DVector};

/// Estimate the rate `v` of the model `y ≈ t * v` together with its
/// standard error, weighting the fit by the observation covariance `vcm`.
///
/// The observations are whitened with the lower Cholesky factor of `vcm`
/// and the whitened system is solved through an economy-size QR
/// factorization. The standard error comes from the weighted least-squares
/// parameter covariance `inv(tᵀ · inv(V) · t)`, specialized to one
/// predictor.
///
/// `vcm` must be symmetric positive definite for the selected observation
/// subset; a Cholesky failure is reported as an error and must abort the
/// pixel rather than produce a substitute value.
pub fn solve_rate(
    y: &DVector<f64>,
    t: &DVector<f64>,
    vcm: &DMatrix<f64>,
) -> RateResult<(f64, f64)> {
    let k = y.len();
    debug_assert_eq!(t.len(), k);
    debug_assert_eq!(vcm.shape(), (k, k));

    let chol = vcm
        .clone()
        .cholesky()
        .ok_or(RateError::NotPositiveDefinite { size: k })?;
    let lower = chol.l();

    // Whiten design vector and observations: solve T·A = t and T·b = y
    let design = lower
        .solve_lower_triangular(t)
        .ok_or(RateError::NotPositiveDefinite { size: k })?;
    let response = lower
        .solve_lower_triangular(y)
        .ok_or(RateError::NotPositiveDefinite { size: k })?;

    // Economy-size QR of the whitened k x 1 design matrix
    let qr = DMatrix::from_column_slice(k, 1, design.as_slice()).qr();
    let z = qr.q().transpose() * &response;
    let rate = qr
        .r()
        .solve_upper_triangular(&z)
        .ok_or(RateError::SingularDesign)?[0];

    // Parameter covariance inv(tᵀ · inv(V) · t), one predictor
    let vcm_inv = chol.inverse();
    let precision = (t.transpose() * &vcm_inv * t)[(0, 0)];
    if precision <= 0.0 || !precision.is_finite() {
        return Err(RateError::SingularDesign);
    }
    let std_err = (1.0 / precision).sqrt();

    Ok((rate, std_err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_two_point_slope_identity_covariance() {
        // With k = 2 and identity weighting the fit through the origin is
        // the exact weighted slope, and for y exactly linear in t it
        // reduces to the simple two-point slope.
        let t = DVector::from_vec(vec![1.0, 3.0]);
        let y = DVector::from_vec(vec![2.0, 6.0]);
        let vcm = DMatrix::identity(2, 2);

        let (rate, err) = solve_rate(&y, &t, &vcm).unwrap();
        assert_relative_eq!(rate, (6.0 - 2.0) / (3.0 - 1.0), epsilon = 1e-12);
        assert!(err > 0.0);
    }

    #[test]
    fn test_exact_linear_observations() {
        let t = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let y = &t * 2.5;
        let vcm = DMatrix::identity(5, 5);

        let (rate, err) = solve_rate(&y, &t, &vcm).unwrap();
        assert_relative_eq!(rate, 2.5, epsilon = 1e-12);
        // err = 1 / sqrt(sum t_i^2) under identity covariance
        let expected = 1.0 / t.norm();
        assert_relative_eq!(err, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_covariance_weighting_changes_estimate() {
        let t = DVector::from_vec(vec![1.0, 2.0]);
        let y = DVector::from_vec(vec![2.0, 10.0]);

        let identity = DMatrix::identity(2, 2);
        // Down-weight the second observation heavily
        let weighted = DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, 100.0]));

        let (rate_id, _) = solve_rate(&y, &t, &identity).unwrap();
        let (rate_w, _) = solve_rate(&y, &t, &weighted).unwrap();

        // Weighted estimate is pulled towards the trusted observation's slope
        assert!((rate_w - 2.0).abs() < (rate_id - 2.0).abs());
    }

    #[test]
    fn test_not_positive_definite_is_rejected() {
        let t = DVector::from_vec(vec![1.0, 2.0]);
        let y = DVector::from_vec(vec![1.0, 2.0]);
        // Negative eigenvalue
        let vcm = DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, -1.0]));

        match solve_rate(&y, &t, &vcm) {
            Err(RateError::NotPositiveDefinite { size }) => assert_eq!(size, 2),
            other => panic!("expected NotPositiveDefinite, got {:?}", other),
        }
    }
}

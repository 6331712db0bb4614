//! Iterative outlier rejection for the per-pixel rate fit (Danish method).
//!
//! One observation is discarded per iteration: the one with the largest
//! covariance-whitened residual, as long as it exceeds the n-sigma
//! threshold. The fit is repeated on the shrunk candidate set until it is
//! clean or too few observations remain.

use crate::core::wls::solve_rate;
use crate::types::{RateError, RateResult};
use nalgebra::{DMatrix, DVector};
use ndarray::{ArrayView1, ArrayView2};

/// Outcome of the iterative fit for one pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FitOutcome {
    /// The fit converged with the given rate, standard error and number of
    /// retained observations.
    Converged {
        rate: f64,
        std_err: f64,
        samples: usize,
    },
    /// The candidate set dropped below the minimum sample threshold before
    /// the residuals were clean. Expected for incoherent pixels.
    InsufficientSamples,
}

/// Extract the covariance submatrix for the selected observation indices.
///
/// Always copies into a fresh dense matrix so workers never alias into the
/// shared full VCM.
pub(crate) fn vcm_subset(vcm: &ArrayView2<f64>, ind: &[usize]) -> DMatrix<f64> {
    let k = ind.len();
    DMatrix::from_fn(k, k, |r, c| vcm[[ind[r], ind[c]]])
}

/// Run the iterative weighted fit on one pixel's observations.
///
/// `obs` holds one value per interferogram in stack order; `ind` is the
/// initial candidate index set into it (already screened for NaN). Each
/// iteration removes at most one index, so the loop terminates within
/// `ind.len() - pthr + 1` passes.
pub fn danish_fit(
    obs: &[f64],
    spans: &ArrayView1<f64>,
    vcm: &ArrayView2<f64>,
    mut ind: Vec<usize>,
    pthr: usize,
    nsig: f64,
) -> RateResult<FitOutcome> {
    while ind.len() >= pthr {
        let k = ind.len();
        let y = DVector::from_iterator(k, ind.iter().map(|&p| obs[p]));
        let t = DVector::from_iterator(k, ind.iter().map(|&p| spans[p]));
        let v = vcm_subset(vcm, &ind);

        let (rate, std_err) = solve_rate(&y, &t, &v)?;

        // Residuals, model minus observations
        let resid = &t * rate - &y;

        // Ratio of residuals to a-priori variances: whiten with the
        // Cholesky factor of inv(V)
        let chol = v
            .cholesky()
            .ok_or(RateError::NotPositiveDefinite { size: k })?;
        let whitener = chol
            .inverse()
            .cholesky()
            .ok_or(RateError::NotPositiveDefinite { size: k })?;
        let wr = whitener.l() * resid;

        // Worst offender; strict comparison keeps the first index on ties
        let mut maxi = 0;
        let mut maxr = f64::NEG_INFINITY;
        for (p, w) in wr.iter().enumerate() {
            if w.abs() > maxr {
                maxr = w.abs();
                maxi = p;
            }
        }

        if maxr > nsig {
            ind.remove(maxi);
        } else {
            return Ok(FitOutcome::Converged {
                rate,
                std_err,
                samples: k,
            });
        }
    }

    Ok(FitOutcome::InsufficientSamples)
}

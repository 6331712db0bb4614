//! Pixel-by-pixel linear rate (velocity) estimation over an interferogram
//! stack using iterative weighted least squares.

use crate::core::rejection::{danish_fit, FitOutcome};
use crate::types::{
    Interferogram, LinearRateParams, PhaseStack, RateError, RateMap, RateResult, SelectionMask,
};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayView3, Axis, Zip};

/// Linear rate estimation processor
pub struct LinearRateEstimator {
    params: LinearRateParams,
}

impl LinearRateEstimator {
    /// Create an estimator with default parameters
    pub fn new() -> Self {
        Self {
            params: LinearRateParams::default(),
        }
    }

    /// Create an estimator with custom parameters
    pub fn with_params(params: LinearRateParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &LinearRateParams {
        &self.params
    }

    /// Estimate the per-pixel linear rate for a sequence of interferograms.
    ///
    /// `vcm` is the temporal variance-covariance matrix between the
    /// interferograms, shared by all pixels; it must be symmetric positive
    /// definite on every per-pixel subset. `mst` optionally marks which
    /// interferograms are treated as independent at each pixel; when
    /// omitted every interferogram is selected. NaN observations are never
    /// selected regardless of the mask.
    pub fn estimate(
        &self,
        ifgs: &[Interferogram],
        vcm: &Array2<f64>,
        mst: Option<&SelectionMask>,
    ) -> RateResult<RateMap> {
        if ifgs.is_empty() {
            return Err(RateError::InvalidInput(
                "No interferograms supplied".to_string(),
            ));
        }

        let (rows, cols) = ifgs[0].shape();
        for (p, ifg) in ifgs.iter().enumerate() {
            if ifg.shape() != (rows, cols) {
                return Err(RateError::InvalidInput(format!(
                    "Interferogram {} has shape {:?}, expected {:?}",
                    p,
                    ifg.shape(),
                    (rows, cols)
                )));
            }
        }

        // 3D block of observations (ifg x row x col) and the matching
        // time-span vector
        let mut stack = PhaseStack::from_elem((ifgs.len(), rows, cols), f32::NAN);
        for (p, ifg) in ifgs.iter().enumerate() {
            stack.index_axis_mut(Axis(0), p).assign(&ifg.phase);
        }
        let spans = Array1::from_iter(ifgs.iter().map(|ifg| ifg.time_span));

        self.estimate_stack(&stack, &spans, vcm, mst)
    }

    /// Estimate the per-pixel linear rate from a pre-assembled observation
    /// stack. Lower-level entry point behind [`estimate`](Self::estimate).
    pub fn estimate_stack(
        &self,
        stack: &PhaseStack,
        spans: &Array1<f64>,
        vcm: &Array2<f64>,
        mst: Option<&SelectionMask>,
    ) -> RateResult<RateMap> {
        let (nifgs, rows, cols) = stack.dim();
        self.validate(stack, spans, vcm, mst)?;

        log::info!(
            "Estimating linear rate for {}x{} pixels from {} interferograms",
            rows,
            cols,
            nifgs
        );
        log::debug!("Estimation parameters: {:?}", self.params);

        let row_results = self.process_rows(
            &stack.view(),
            &spans.view(),
            &vcm.view(),
            mst.map(|m| m.view()),
        );

        let mut product = RateMap::nan(rows, cols);
        for (i, row) in row_results.into_iter().enumerate() {
            for (j, (rate, err, samples)) in row.into_iter().enumerate() {
                product.rate[[i, j]] = rate;
                product.error[[i, j]] = err;
                product.samples[[i, j]] = samples;
            }
        }

        // Discard estimates whose standard error exceeds the maximum sigma
        // threshold. Applied once over the whole grid, after all pixels.
        let maxsig = self.params.maxsig as f32;
        Zip::from(&mut product.rate)
            .and(&mut product.error)
            .and(&mut product.samples)
            .for_each(|rate, err, samples| {
                if *err > maxsig {
                    *rate = f32::NAN;
                    *err = f32::NAN;
                    *samples = f32::NAN;
                }
            });

        log::info!(
            "Linear rate estimation completed: {}/{} pixels converged",
            product.valid_pixels(),
            rows * cols
        );
        Ok(product)
    }

    fn validate(
        &self,
        stack: &PhaseStack,
        spans: &Array1<f64>,
        vcm: &Array2<f64>,
        mst: Option<&SelectionMask>,
    ) -> RateResult<()> {
        let (nifgs, _, _) = stack.dim();

        if spans.len() != nifgs {
            return Err(RateError::InvalidInput(format!(
                "Time-span vector has length {}, expected {}",
                spans.len(),
                nifgs
            )));
        }
        if vcm.dim() != (nifgs, nifgs) {
            return Err(RateError::InvalidInput(format!(
                "VCM has shape {:?}, expected {:?}",
                vcm.dim(),
                (nifgs, nifgs)
            )));
        }
        if let Some(mask) = mst {
            if mask.dim() != stack.dim() {
                return Err(RateError::InvalidInput(format!(
                    "MST mask has shape {:?}, expected {:?}",
                    mask.dim(),
                    stack.dim()
                )));
            }
        }
        if self.params.pthr < 2 {
            return Err(RateError::InvalidInput(
                "Pixel threshold pthr must be at least 2".to_string(),
            ));
        }
        if !(self.params.nsig > 0.0) {
            return Err(RateError::InvalidInput(
                "Residual threshold nsig must be positive".to_string(),
            ));
        }
        if !(self.params.maxsig > 0.0) {
            return Err(RateError::InvalidInput(
                "Maximum sigma threshold maxsig must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Process all grid rows in parallel. Each worker owns its output row
    /// and extracts its own covariance submatrices, so rows never contend.
    #[cfg(feature = "parallel")]
    fn process_rows(
        &self,
        stack: &ArrayView3<f32>,
        spans: &ArrayView1<f64>,
        vcm: &ArrayView2<f64>,
        mst: Option<ArrayView3<bool>>,
    ) -> Vec<Vec<(f32, f32, f32)>> {
        use rayon::prelude::*;

        let (_, rows, _) = stack.dim();
        (0..rows)
            .into_par_iter()
            .map(|i| self.process_row(stack, spans, vcm, mst.as_ref(), i))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn process_rows(
        &self,
        stack: &ArrayView3<f32>,
        spans: &ArrayView1<f64>,
        vcm: &ArrayView2<f64>,
        mst: Option<ArrayView3<bool>>,
    ) -> Vec<Vec<(f32, f32, f32)>> {
        let (_, rows, _) = stack.dim();
        (0..rows)
            .map(|i| self.process_row(stack, spans, vcm, mst.as_ref(), i))
            .collect()
    }

    fn process_row(
        &self,
        stack: &ArrayView3<f32>,
        spans: &ArrayView1<f64>,
        vcm: &ArrayView2<f64>,
        mst: Option<&ArrayView3<bool>>,
        i: usize,
    ) -> Vec<(f32, f32, f32)> {
        let (nifgs, rows, cols) = stack.dim();
        if i % 50 == 0 {
            log::debug!("Calculating linear rate for line {}/{}", i, rows);
        }

        let mut row = vec![(f32::NAN, f32::NAN, f32::NAN); cols];
        for j in 0..cols {
            // Per-pixel observation vector and the indices of independent,
            // coherent interferograms
            let obs: Vec<f64> = (0..nifgs).map(|p| stack[[p, i, j]] as f64).collect();
            let ind: Vec<usize> = (0..nifgs)
                .filter(|&p| {
                    obs[p].is_finite() && mst.map_or(true, |mask| mask[[p, i, j]])
                })
                .collect();

            if ind.len() < self.params.pthr {
                continue;
            }

            match danish_fit(&obs, spans, vcm, ind, self.params.pthr, self.params.nsig) {
                Ok(FitOutcome::Converged {
                    rate,
                    std_err,
                    samples,
                }) => {
                    row[j] = (rate as f32, std_err as f32, samples as f32);
                }
                Ok(FitOutcome::InsufficientSamples) => {}
                Err(e) => {
                    // Numerical failure is contained to this pixel
                    log::warn!("Rate estimation failed at pixel ({}, {}): {}", i, j, e);
                }
            }
        }
        row
    }
}

impl Default for LinearRateEstimator {
    fn default() -> Self {
        Self::new()
    }
}

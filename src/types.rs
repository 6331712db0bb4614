use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

/// Real-valued phase/displacement observation data
pub type Phase = f32;

/// 2D phase grid for a single interferogram (row x column)
pub type PhaseGrid = Array2<Phase>;

/// 3D observation stack (ifg x row x column)
pub type PhaseStack = Array3<Phase>;

/// Per-pixel interferogram selection mask (ifg x row x column)
pub type SelectionMask = Array3<bool>;

/// One time-differenced interferometric observation layer.
///
/// `phase` holds one scalar observation per pixel, NaN where no coherent
/// observation exists. `time_span` is the temporal baseline of the
/// interferometric pair in years and acts as the single design-matrix
/// predictor for the rate fit.
#[derive(Debug, Clone)]
pub struct Interferogram {
    pub phase: PhaseGrid,
    pub time_span: f64,
}

impl Interferogram {
    pub fn new(phase: PhaseGrid, time_span: f64) -> Self {
        Self { phase, time_span }
    }

    /// Spatial shape (rows, cols) of the phase grid.
    pub fn shape(&self) -> (usize, usize) {
        self.phase.dim()
    }
}

/// Per-pixel linear rate product: rate, standard error and the number of
/// observations retained by the outlier rejection. All three grids share
/// the spatial shape of a single interferogram and hold NaN for pixels
/// without a converged solution.
#[derive(Debug, Clone)]
pub struct RateMap {
    pub rate: Array2<f32>,
    pub error: Array2<f32>,
    pub samples: Array2<f32>,
}

impl RateMap {
    /// Allocate a NaN-initialized product of the given spatial shape.
    pub fn nan(rows: usize, cols: usize) -> Self {
        Self {
            rate: Array2::from_elem((rows, cols), f32::NAN),
            error: Array2::from_elem((rows, cols), f32::NAN),
            samples: Array2::from_elem((rows, cols), f32::NAN),
        }
    }

    /// Spatial shape (rows, cols) of the product grids.
    pub fn shape(&self) -> (usize, usize) {
        self.rate.dim()
    }

    /// Number of pixels that carry a converged rate estimate.
    pub fn valid_pixels(&self) -> usize {
        self.rate.iter().filter(|v| v.is_finite()).count()
    }
}

/// Parameters controlling the rate estimation and outlier rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRateParams {
    /// Minimum number of coherent observations for a pixel
    pub pthr: usize,
    /// n-sigma ratio used to threshold whitened model-minus-observation residuals
    pub nsig: f64,
    /// Maximum allowable standard error; larger estimates are discarded
    pub maxsig: f64,
}

impl Default for LinearRateParams {
    fn default() -> Self {
        Self {
            pthr: 3,        // at least 3 observations per pixel
            nsig: 3.0,      // 3-sigma residual rejection
            maxsig: 1000.0, // effectively uncapped unless configured
        }
    }
}

/// Error types for rate estimation
#[derive(Debug, thiserror::Error)]
pub enum RateError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Covariance submatrix of size {size} is not positive definite")]
    NotPositiveDefinite { size: usize },

    #[error("Singular design matrix in least-squares solve")]
    SingularDesign,
}

/// Result type for rate estimation operations
pub type RateResult<T> = Result<T, RateError>;

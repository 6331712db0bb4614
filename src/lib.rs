//! stackrate: Pixel-wise linear deformation rate estimation for InSAR stacks
//!
//! This library estimates a robust linear rate (velocity) independently for
//! every pixel of an interferogram stack, using covariance-weighted least
//! squares combined with iterative outlier rejection (the Danish method).
//! Each pixel reports a rate, its standard error and the number of
//! observations retained, or stays NaN when no clean fit exists.

pub mod core;
pub mod types;

// Re-export main types and functions for easier access
pub use crate::core::{danish_fit, solve_rate, FitOutcome, LinearRateEstimator};
pub use types::{
    Interferogram, LinearRateParams, Phase, PhaseGrid, PhaseStack, RateError, RateMap,
    RateResult, SelectionMask,
};

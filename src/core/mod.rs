//! Core rate estimation modules

pub mod linear_rate;
pub mod rejection;
pub mod wls;

// Re-export main types
pub use linear_rate::LinearRateEstimator;
pub use rejection::{danish_fit, FitOutcome};
pub use wls::solve_rate;

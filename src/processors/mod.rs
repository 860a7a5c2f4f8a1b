//! Data processing modules.

pub mod extraction;
pub mod histogram;
pub mod kinematics;

// Re-export key types for convenience
pub use extraction::{
    apply, extract_directory, fit, fit_transform, ExtractionError, ExtractionSummary,
    FittedTransform,
};
pub use histogram::{
    analyze_conditions, make_histogram, BinGrid, ConditionReport, Histogram, HistogramError,
    HistogramOptions,
};
pub use kinematics::{
    compute_acceleration, compute_velocity, DerivativeField, KinematicsError, Measure,
};

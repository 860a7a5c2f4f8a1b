//! Finite-difference velocity and acceleration magnitudes.
//!
//! Inputs are `(frames, joints * dim)` position arrays. Norms are taken per
//! joint over its `dim` coordinates, never across joints. No smoothing is
//! applied.

use std::fmt;
use std::str::FromStr;

use ndarray::{s, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during derivative computation.
#[derive(Debug, Error)]
pub enum KinematicsError {
    #[error("Shape error: {measure} needs at least {required} frames, got {actual}")]
    Shape {
        measure: Measure,
        required: usize,
        actual: usize,
    },

    #[error("Invalid dimensionality: {0}")]
    InvalidDim(usize),

    #[error("Unknown measure: '{0}'. Choose from [velocity, acceleration]")]
    UnknownMeasure(String),
}

/// Result type for kinematics operations.
pub type Result<T> = std::result::Result<T, KinematicsError>;

/// One magnitude per (frame, joint); rows are shorter than the source by the
/// derivative order.
pub type DerivativeField = Array2<f64>;

/// Kinematic quantity to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Measure {
    Velocity,
    Acceleration,
}

impl Measure {
    /// Finite-difference order.
    #[inline]
    pub fn order(self) -> usize {
        match self {
            Self::Velocity => 1,
            Self::Acceleration => 2,
        }
    }

    /// Three-letter tag used in report file names.
    pub fn short_name(self) -> &'static str {
        match self {
            Self::Velocity => "vel",
            Self::Acceleration => "acc",
        }
    }

    /// Axis label for plots.
    pub fn unit_label(self) -> &'static str {
        match self {
            Self::Velocity => "Velocity (cm/s)",
            Self::Acceleration => "Acceleration (cm/s^2)",
        }
    }

    /// Compute this measure for a position array.
    pub fn compute(self, data: ArrayView2<'_, f64>, dim: usize, sample_rate: f64) -> Result<DerivativeField> {
        match self {
            Self::Velocity => compute_velocity(data, dim, sample_rate),
            Self::Acceleration => compute_acceleration(data, dim, sample_rate),
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Velocity => write!(f, "velocity"),
            Self::Acceleration => write!(f, "acceleration"),
        }
    }
}

impl FromStr for Measure {
    type Err = KinematicsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "velocity" => Ok(Self::Velocity),
            "acceleration" => Ok(Self::Acceleration),
            other => Err(KinematicsError::UnknownMeasure(other.to_string())),
        }
    }
}

/// Per-joint Euclidean norms of each row of `diffs`, scaled by `scale`.
///
/// Trailing columns that do not fill a whole joint are ignored.
fn joint_norms(diffs: &Array2<f64>, dim: usize, scale: f64) -> DerivativeField {
    let num_joints = diffs.ncols() / dim;
    Array2::from_shape_fn((diffs.nrows(), num_joints), |(i, j)| {
        let start = j * dim;
        diffs
            .slice(s![i, start..start + dim])
            .iter()
            .map(|v| v * v)
            .sum::<f64>()
            .sqrt()
            * scale
    })
}

fn check_frames(measure: Measure, data: &ArrayView2<'_, f64>, dim: usize) -> Result<()> {
    if dim == 0 {
        return Err(KinematicsError::InvalidDim(dim));
    }
    let required = measure.order() + 1;
    if data.nrows() < required {
        return Err(KinematicsError::Shape {
            measure,
            required,
            actual: data.nrows(),
        });
    }
    Ok(())
}

/// Velocity magnitude between adjacent frames.
///
/// Returns `frames - 1` rows, in units per second at `sample_rate` Hz.
///
/// # Errors
///
/// `Shape` when fewer than 2 frames are given.
pub fn compute_velocity(data: ArrayView2<'_, f64>, dim: usize, sample_rate: f64) -> Result<DerivativeField> {
    check_frames(Measure::Velocity, &data, dim)?;
    let diffs = &data.slice(s![1.., ..]) - &data.slice(s![..-1, ..]);
    Ok(joint_norms(&diffs, dim, sample_rate))
}

/// Acceleration magnitude from the second difference of positions.
///
/// Returns `frames - 2` rows, scaled by `sample_rate²`.
///
/// # Errors
///
/// `Shape` when fewer than 3 frames are given.
pub fn compute_acceleration(
    data: ArrayView2<'_, f64>,
    dim: usize,
    sample_rate: f64,
) -> Result<DerivativeField> {
    check_frames(Measure::Acceleration, &data, dim)?;
    let first = &data.slice(s![1.., ..]) - &data.slice(s![..-1, ..]);
    let second = &first.slice(s![1.., ..]) - &first.slice(s![..-1, ..]);
    Ok(joint_norms(&second, dim, sample_rate * sample_rate))
}

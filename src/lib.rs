//! Motion-capture feature extraction and kinematic statistics.
//!
//! This crate provides tools for:
//! - Parsing BVH recordings and converting them to fixed-rate, fixed-layout
//!   world-space joint position arrays (`.npy`)
//! - Fitting the extraction transform once per batch and reusing it later
//! - Computing per-joint velocity and acceleration magnitudes
//! - Aggregating them into per-condition histograms on a shared bin grid
//!
//! # Example
//!
//! ```no_run
//! use mocap_pipeline::core::loaders::load_feature_array;
//! use mocap_pipeline::processors::kinematics::compute_velocity;
//!
//! let array = load_feature_array("take_01.npy").unwrap();
//! let speeds = compute_velocity(array.view(), 3, 30.0).unwrap();
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;
pub mod visualization;

pub use config::{AnalysisConfig, ExtractionConfig, ParameterizationMode, PipelineConfig, PlotConfig};
pub use core::loaders::{FeatureArray, JointTopology, RawMotion};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

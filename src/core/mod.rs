//! Core data types and I/O operations.

pub mod loaders;
pub mod transforms;
pub mod writers;

pub use loaders::{BvhParser, FeatureArray, JointTopology, MotionParser, RawMotion, Skeleton};
pub use transforms::{Parameterizer, PositionParameterizer, TransformError};
pub use writers::{write_feature_array, write_histogram_csv, write_yaml, WriteError};

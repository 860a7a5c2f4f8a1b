//! Motion transforms: downsampling, joint selection and parameterization.
//!
//! Downsampling works by frame selection only; rotation channels are never
//! interpolated. Per-frame forward kinematics is parallelized with Rayon.

use log::warn;
use nalgebra::{Rotation3, Vector3};
use rayon::prelude::*;
use thiserror::Error;

use crate::config::ParameterizationMode;
use super::loaders::{FeatureArray, JointTopology, RawMotion};

/// Errors that can occur while transforming a motion.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Recording too short: need at least {required} frames, got {actual}")]
    DataTooShort { required: usize, actual: usize },

    #[error("Unknown joint '{0}' not present in source skeleton")]
    UnknownJoint(String),

    #[error("Invalid frame rate: {0}")]
    InvalidFrameRate(f64),
}

/// Result type for transform operations.
pub type Result<T> = std::result::Result<T, TransformError>;

/// Frame stride that brings `source_fps` down to `target_fps`.
///
/// Non-integer ratios are rounded to the nearest stride. A source slower than
/// the target keeps every frame.
pub fn downsample_stride(source_fps: f64, target_fps: f64) -> Result<usize> {
    if !(source_fps > 0.0) || !source_fps.is_finite() {
        return Err(TransformError::InvalidFrameRate(source_fps));
    }
    if !(target_fps > 0.0) || !target_fps.is_finite() {
        return Err(TransformError::InvalidFrameRate(target_fps));
    }

    let ratio = source_fps / target_fps;
    let stride = ratio.round().max(1.0) as usize;
    if ratio >= 1.0 && (ratio - stride as f64).abs() > 1e-3 {
        warn!(
            "Source rate {:.3} fps is not a multiple of target {:.3} fps, using stride {}",
            source_fps, target_fps, stride
        );
    }
    Ok(stride)
}

/// Resample a motion to `target_fps` by strided frame selection.
///
/// Keeps frames `0, stride, 2 * stride, ...`.
///
/// # Errors
///
/// Returns `DataTooShort` when the recording spans less than one target-rate
/// period, and `InvalidFrameRate` for non-positive rates.
pub fn downsample(motion: &RawMotion, target_fps: f64) -> Result<RawMotion> {
    let stride = downsample_stride(motion.frame_rate(), target_fps)?;

    if motion.num_frames() == 0 || motion.num_frames() < stride {
        return Err(TransformError::DataTooShort {
            required: stride.max(1),
            actual: motion.num_frames(),
        });
    }

    let frames: Vec<Vec<f64>> = motion.frames.iter().step_by(stride).cloned().collect();

    Ok(RawMotion {
        skeleton: motion.skeleton.clone(),
        frame_time: motion.frame_time * stride as f64,
        frames,
        source_path: motion.source_path.clone(),
    })
}

impl JointTopology {
    /// Filter this topology down to `requested`, keeping canonical order.
    ///
    /// # Errors
    ///
    /// Returns `UnknownJoint` for the first requested name not in `self`.
    pub fn select(&self, requested: &[String]) -> Result<JointTopology> {
        if let Some(missing) = requested.iter().find(|name| !self.contains(name)) {
            return Err(TransformError::UnknownJoint(missing.clone()));
        }

        let names = self
            .names()
            .iter()
            .filter(|name| requested.contains(name))
            .cloned()
            .collect();

        Ok(JointTopology::new(names))
    }
}

/// Resolve the joint subset and prepare the motion for parameterization.
///
/// Channels of joints outside the subset are zeroed, so an unselected joint
/// only contributes its rest offset to the chain. Root translation follows
/// `include_root`: with `false` it is zeroed so that the skeleton is locked in
/// place, with `true` it is kept even if the root is not selected.
pub fn select_joints(
    motion: &RawMotion,
    requested: &[String],
    include_root: bool,
) -> Result<(RawMotion, JointTopology)> {
    let topology = motion.skeleton.topology().select(requested)?;

    let channel_offsets = motion.skeleton.channel_offsets();
    let mut zeroed: Vec<usize> = Vec::new();
    for (idx, joint) in motion.skeleton.joints.iter().enumerate() {
        let selected = topology.contains(&joint.name);
        for (k, channel) in joint.channels.iter().enumerate() {
            let zero = if idx == 0 && channel.is_position() {
                !include_root
            } else {
                !selected
            };
            if zero {
                zeroed.push(channel_offsets[idx] + k);
            }
        }
    }

    let mut prepared = motion.clone();
    for frame in &mut prepared.frames {
        for &slot in &zeroed {
            frame[slot] = 0.0;
        }
    }

    Ok((prepared, topology))
}

/// Capability for converting hierarchical channels into numeric columns.
pub trait Parameterizer: Send + Sync {
    fn apply(
        &self,
        motion: &RawMotion,
        joints: &JointTopology,
        mode: ParameterizationMode,
    ) -> Result<FeatureArray>;
}

/// World-space joint positions via forward kinematics.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionParameterizer;

impl Parameterizer for PositionParameterizer {
    fn apply(
        &self,
        motion: &RawMotion,
        joints: &JointTopology,
        mode: ParameterizationMode,
    ) -> Result<FeatureArray> {
        match mode {
            ParameterizationMode::Position => world_positions(motion, joints),
        }
    }
}

fn axis_rotation(axis: usize, degrees: f64) -> Rotation3<f64> {
    let angle = degrees.to_radians();
    match axis {
        0 => Rotation3::from_axis_angle(&Vector3::x_axis(), angle),
        1 => Rotation3::from_axis_angle(&Vector3::y_axis(), angle),
        _ => Rotation3::from_axis_angle(&Vector3::z_axis(), angle),
    }
}

/// Forward kinematics over every frame, emitting the joints of `topology`.
pub fn world_positions(motion: &RawMotion, topology: &JointTopology) -> Result<FeatureArray> {
    let skeleton = &motion.skeleton;
    let columns: Vec<usize> = topology
        .names()
        .iter()
        .map(|name| {
            skeleton
                .joint_index(name)
                .ok_or_else(|| TransformError::UnknownJoint(name.clone()))
        })
        .collect::<Result<_>>()?;
    let channel_offsets = skeleton.channel_offsets();

    let frames: Vec<Vec<[f64; 3]>> = motion
        .frames
        .par_iter()
        .map(|values| {
            let mut rotations: Vec<Rotation3<f64>> = Vec::with_capacity(skeleton.len());
            let mut positions: Vec<Vector3<f64>> = Vec::with_capacity(skeleton.len());

            for (idx, joint) in skeleton.joints.iter().enumerate() {
                let mut local_rot = Rotation3::identity();
                let mut local_pos = Vector3::from(joint.offset);

                let base = channel_offsets[idx];
                for (k, channel) in joint.channels.iter().enumerate() {
                    let value = values[base + k];
                    if channel.is_position() {
                        local_pos[channel.axis()] += value;
                    } else {
                        local_rot *= axis_rotation(channel.axis(), value);
                    }
                }

                match joint.parent {
                    Some(p) => {
                        positions.push(positions[p] + rotations[p] * local_pos);
                        rotations.push(rotations[p] * local_rot);
                    }
                    None => {
                        positions.push(local_pos);
                        rotations.push(local_rot);
                    }
                }
            }

            columns
                .iter()
                .map(|&j| [positions[j].x, positions[j].y, positions[j].z])
                .collect()
        })
        .collect();

    if frames.is_empty() {
        return Ok(FeatureArray::new(ndarray::Array2::zeros((0, columns.len() * 3))));
    }
    Ok(FeatureArray::from_positions(&frames))
}

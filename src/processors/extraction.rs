//! Feature extraction from BVH recordings.
//!
//! Extraction is an explicit two-phase protocol: [`fit`] inspects the whole
//! batch once and produces a [`FittedTransform`]; [`apply`] runs that fixed
//! transform on one recording. Because every array is produced from the same
//! fitted joint list, all outputs of a batch share one column layout.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ExtractionConfig, ParameterizationMode};
use crate::core::loaders::{find_files, FeatureArray, JointTopology, MotionParser, RawMotion};
use crate::core::transforms::{
    downsample, downsample_stride, select_joints, Parameterizer, TransformError,
};
use crate::core::writers::{self, write_feature_array, write_yaml};

/// File name of the persisted transform inside the pipeline directory.
pub const FITTED_TRANSFORM_FILE: &str = "data_pipe.yaml";

/// Errors that can occur during extraction.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("No BVH files found in {folder}")]
    NoFilesFound { folder: PathBuf },

    #[error("Cannot fit a transform on an empty batch")]
    EmptyBatch,

    #[error("Extraction produced {outputs} arrays for {inputs} input files")]
    CardinalityMismatch { inputs: usize, outputs: usize },

    #[error("Array for '{source_name}' has {actual} columns, expected {expected}")]
    ColumnMismatch {
        source_name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Inputs {first} and {second} would both be written to {output}")]
    DuplicateOutput {
        first: PathBuf,
        second: PathBuf,
        output: PathBuf,
    },

    #[error(transparent)]
    Transform(#[from] TransformError),
}

/// Parameters discovered by [`fit`] and reused for every recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedTransform {
    /// Output frame rate.
    pub target_fps: f64,
    /// Exported joints, in column order.
    pub joints: JointTopology,
    /// Whether root translation is kept.
    pub include_root: bool,
    pub mode: ParameterizationMode,
    /// Frame rate of the first recording of the fitted batch.
    pub source_fps: f64,
}

impl FittedTransform {
    /// Columns of every array produced by this transform.
    #[inline]
    pub fn num_columns(&self) -> usize {
        self.joints.len() * 3
    }

    /// Persist the transform as YAML.
    pub fn save(&self, path: &Path) -> writers::Result<()> {
        write_yaml(path, self)
    }

    /// Load a previously persisted transform.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read fitted transform: {}", path.display()))?;
        let fitted = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse fitted transform: {}", path.display()))?;
        Ok(fitted)
    }
}

fn source_name(motion: &RawMotion) -> String {
    motion
        .source_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<memory>".to_string())
}

/// Fit the extraction transform on a whole batch.
///
/// The exported joint order is the canonical order of the first recording's
/// skeleton. Every recording must contain every requested joint.
///
/// # Errors
///
/// `EmptyBatch` for an empty batch, `UnknownJoint` if any recording lacks a
/// requested joint, `InvalidFrameRate` for a non-positive target rate.
pub fn fit(
    batch: &[RawMotion],
    config: &ExtractionConfig,
) -> std::result::Result<FittedTransform, ExtractionError> {
    let first = batch.first().ok_or(ExtractionError::EmptyBatch)?;

    let joints = first.skeleton.topology().select(&config.target_joints)?;
    for motion in &batch[1..] {
        motion.skeleton.topology().select(&config.target_joints)?;
    }

    let source_fps = first.frame_rate();
    downsample_stride(source_fps, config.target_fps)?;

    info!(
        "Fitted transform on {} recordings: {} joints, {:.2} -> {:.2} fps",
        batch.len(),
        joints.len(),
        source_fps,
        config.target_fps
    );

    Ok(FittedTransform {
        target_fps: config.target_fps,
        joints,
        include_root: config.include_root,
        mode: config.mode,
        source_fps,
    })
}

/// Apply a fitted transform to one recording.
///
/// Downsamples, resolves the fitted joints, locks the root if configured and
/// parameterizes. The result always has `fitted.num_columns()` columns.
pub fn apply(
    fitted: &FittedTransform,
    motion: &RawMotion,
    parameterizer: &dyn Parameterizer,
) -> std::result::Result<FeatureArray, ExtractionError> {
    let resampled = downsample(motion, fitted.target_fps)?;
    let (prepared, _) = select_joints(&resampled, fitted.joints.names(), fitted.include_root)?;
    let array = parameterizer.apply(&prepared, &fitted.joints, fitted.mode)?;

    if array.num_columns() != fitted.num_columns() {
        return Err(ExtractionError::ColumnMismatch {
            source_name: source_name(motion),
            expected: fitted.num_columns(),
            actual: array.num_columns(),
        });
    }

    debug!(
        "{}: {} frames -> {} frames",
        source_name(motion),
        motion.num_frames(),
        array.num_frames()
    );
    Ok(array)
}

/// Fit on the batch, then apply to every recording.
///
/// Returns exactly one array per input recording, in input order.
pub fn fit_transform(
    batch: &[RawMotion],
    config: &ExtractionConfig,
    parameterizer: &dyn Parameterizer,
) -> std::result::Result<(FittedTransform, Vec<FeatureArray>), ExtractionError> {
    let fitted = fit(batch, config)?;

    let arrays = batch
        .par_iter()
        .map(|motion| apply(&fitted, motion, parameterizer))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if arrays.len() != batch.len() {
        return Err(ExtractionError::CardinalityMismatch {
            inputs: batch.len(),
            outputs: arrays.len(),
        });
    }

    Ok((fitted, arrays))
}

/// Output path for `input`: same base name, `.npy` extension, in `dest_dir`.
pub fn output_path_for(input: &Path, dest_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    dest_dir.join(format!("{}.npy", stem))
}

/// Output paths for a batch of inputs, one per input and all distinct.
///
/// # Errors
///
/// `DuplicateOutput` when two inputs share a base name, e.g. `take.bvh` and
/// `take.BVH`.
pub fn output_paths_for(
    inputs: &[PathBuf],
    dest_dir: &Path,
) -> std::result::Result<Vec<PathBuf>, ExtractionError> {
    let mut seen: HashSet<PathBuf> = HashSet::with_capacity(inputs.len());
    let mut outputs = Vec::with_capacity(inputs.len());

    for (idx, input) in inputs.iter().enumerate() {
        let out = output_path_for(input, dest_dir);
        if !seen.insert(out.clone()) {
            let first = inputs[..idx]
                .iter()
                .find(|other| output_path_for(other, dest_dir) == out)
                .cloned()
                .unwrap_or_default();
            return Err(ExtractionError::DuplicateOutput {
                first,
                second: input.clone(),
                output: out,
            });
        }
        outputs.push(out);
    }

    Ok(outputs)
}

/// Summary of a finished extraction run.
#[derive(Debug, Clone)]
pub struct ExtractionSummary {
    pub outputs: Vec<PathBuf>,
    pub transform_path: PathBuf,
    pub num_frames: usize,
    pub num_columns: usize,
}

/// Extract features from every `.bvh` file in `bvh_dir`.
///
/// Writes one `.npy` array per input to `dest_dir` and the fitted transform
/// to `pipeline_dir/data_pipe.yaml`.
pub fn extract_directory(
    bvh_dir: &Path,
    dest_dir: &Path,
    pipeline_dir: &Path,
    config: &ExtractionConfig,
    parser: &dyn MotionParser,
    parameterizer: &dyn Parameterizer,
) -> Result<ExtractionSummary> {
    let files = find_files(bvh_dir, "bvh");
    if files.is_empty() {
        return Err(ExtractionError::NoFilesFound {
            folder: bvh_dir.to_path_buf(),
        }
        .into());
    }

    let output_paths = output_paths_for(&files, dest_dir)?;

    for file in &files {
        info!("Parsing {}", file.display());
    }

    let batch = files
        .par_iter()
        .map(|file| {
            parser
                .parse(file)
                .with_context(|| format!("Failed to parse motion file: {}", file.display()))
        })
        .collect::<Result<Vec<RawMotion>>>()?;

    let (fitted, arrays) = fit_transform(&batch, config, parameterizer)?;

    if arrays.len() != files.len() {
        return Err(ExtractionError::CardinalityMismatch {
            inputs: files.len(),
            outputs: arrays.len(),
        }
        .into());
    }

    let transform_path = pipeline_dir.join(FITTED_TRANSFORM_FILE);
    fitted
        .save(&transform_path)
        .with_context(|| format!("Failed to save fitted transform: {}", transform_path.display()))?;

    let mut outputs = Vec::with_capacity(files.len());
    let mut num_frames = 0;
    for (out, array) in output_paths.into_iter().zip(arrays.iter()) {
        write_feature_array(&out, array)
            .with_context(|| format!("Failed to write features: {}", out.display()))?;
        info!("Wrote {} ({} x {})", out.display(), array.num_frames(), array.num_columns());
        num_frames += array.num_frames();
        outputs.push(out);
    }

    Ok(ExtractionSummary {
        outputs,
        transform_path,
        num_frames,
        num_columns: fitted.num_columns(),
    })
}

//! Per-joint histograms of velocity / acceleration magnitudes.
//!
//! All conditions of a run share one bin grid `[0, w, 2w, ..]` bounded by a
//! fixed upper edge, so their frequencies can be compared bin for bin. Every
//! bin is right-open: a value equal to an edge belongs to the bin starting at
//! that edge, and values at or above the last edge are not counted.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};
use ndarray::{s, Axis};
use rayon::prelude::*;
use thiserror::Error;

use crate::config::AnalysisConfig;
use crate::core::loaders::{find_files, load_feature_array};
use crate::core::writers::write_histogram_csv;
use crate::visualization::FrequencyPlot;
use super::kinematics::{DerivativeField, KinematicsError, Measure};

/// Errors that can occur while building histograms.
#[derive(Debug, Error)]
pub enum HistogramError {
    #[error(transparent)]
    Kinematics(#[from] KinematicsError),

    #[error("Invalid bin width {width} for upper bound {upper_bound}")]
    InvalidGrid { width: f64, upper_bound: f64 },

    #[error("No feature arrays found for condition '{name}' in {dir}")]
    EmptyCondition { name: String, dir: PathBuf },

    #[error("--coords_dir argument is wrong: there is no data in '{0}'")]
    NoConditions(PathBuf),

    #[error("Expected {expected} joints, got {actual}")]
    JointCountMismatch { expected: usize, actual: usize },

    #[error("Array has {columns} columns, cannot strip {skip} leading columns")]
    TooFewColumns { columns: usize, skip: usize },

    #[error("Joint index {index} out of range for {num_joints} joints")]
    InvalidSelection { index: usize, num_joints: usize },

    #[error("Cannot merge histograms with different bin grids")]
    GridMismatch,
}

/// Upper limit on the number of bin edges of a grid.
pub const MAX_EDGES: usize = 10_000_000;

/// Label of the aggregate column.
pub const TOTAL_LABEL: &str = "Total";

/// Fixed bin edges shared by every histogram of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct BinGrid {
    width: f64,
    edges: Vec<f64>,
}

impl BinGrid {
    /// Edges `0, width, 2 * width, ...` up to and including the first edge
    /// reaching `upper_bound`.
    ///
    /// Fails with `InvalidGrid` for a non-positive width, a negative bound, or
    /// a grid with more than [`MAX_EDGES`] edges.
    pub fn new(width: f64, upper_bound: f64) -> std::result::Result<Self, HistogramError> {
        let invalid = HistogramError::InvalidGrid { width, upper_bound };
        if !(width > 0.0) || !width.is_finite() || !(upper_bound >= 0.0) || !upper_bound.is_finite() {
            return Err(invalid);
        }

        let count = ((upper_bound + width) / width).ceil();
        if !(count >= 2.0) || count > MAX_EDGES as f64 {
            return Err(invalid);
        }

        let edges = (0..count as usize).map(|k| k as f64 * width).collect();
        Ok(Self { width, edges })
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.width
    }

    #[inline]
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Lower edge of every bin.
    #[inline]
    pub fn lower_edges(&self) -> &[f64] {
        &self.edges[..self.num_bins()]
    }

    #[inline]
    pub fn num_bins(&self) -> usize {
        self.edges.len() - 1
    }

    /// Bin holding `value`, or `None` if it lies outside the grid.
    pub fn bin_index(&self, value: f64) -> Option<usize> {
        if !value.is_finite() {
            return None;
        }
        let above = self.edges.partition_point(|&e| e <= value);
        if above == 0 || above > self.num_bins() {
            return None;
        }
        Some(above - 1)
    }
}

/// Per-joint bin counts over one grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    grid: BinGrid,
    joints: Vec<Vec<u64>>,
}

impl Histogram {
    pub fn new(grid: BinGrid, num_joints: usize) -> Self {
        let joints = vec![vec![0; grid.num_bins()]; num_joints];
        Self { grid, joints }
    }

    #[inline]
    pub fn grid(&self) -> &BinGrid {
        &self.grid
    }

    #[inline]
    pub fn num_joints(&self) -> usize {
        self.joints.len()
    }

    /// Counts of one joint, one entry per bin.
    pub fn joint_counts(&self, joint: usize) -> &[u64] {
        &self.joints[joint]
    }

    /// Bin every value of a derivative field, one column per joint.
    pub fn add_field(&mut self, field: &DerivativeField) -> std::result::Result<(), HistogramError> {
        if field.ncols() != self.num_joints() {
            return Err(HistogramError::JointCountMismatch {
                expected: self.num_joints(),
                actual: field.ncols(),
            });
        }

        for (joint, column) in field.axis_iter(Axis(1)).enumerate() {
            let counts = &mut self.joints[joint];
            for &value in column.iter() {
                if let Some(bin) = self.grid.bin_index(value) {
                    counts[bin] += 1;
                }
            }
        }
        Ok(())
    }

    /// Elementwise sum of two histograms over the same grid.
    pub fn merge(mut self, other: Histogram) -> std::result::Result<Histogram, HistogramError> {
        if self.grid != other.grid {
            return Err(HistogramError::GridMismatch);
        }
        if self.num_joints() != other.num_joints() {
            return Err(HistogramError::JointCountMismatch {
                expected: self.num_joints(),
                actual: other.num_joints(),
            });
        }

        for (mine, theirs) in self.joints.iter_mut().zip(other.joints.iter()) {
            for (a, b) in mine.iter_mut().zip(theirs.iter()) {
                *a += b;
            }
        }
        Ok(self)
    }

    /// Sum over joints for every bin.
    pub fn total(&self) -> Vec<u64> {
        let mut total = vec![0; self.grid.num_bins()];
        for counts in &self.joints {
            for (t, c) in total.iter_mut().zip(counts.iter()) {
                *t += c;
            }
        }
        total
    }

    /// Number of samples counted over all joints and bins.
    pub fn population(&self) -> u64 {
        self.joints.iter().flatten().sum()
    }
}

/// Parameters of one histogram run.
#[derive(Debug, Clone)]
pub struct HistogramOptions {
    pub measure: Measure,
    pub width: f64,
    pub upper_bound: f64,
    pub sample_rate: f64,
    pub dim: usize,
    pub skip_leading_columns: usize,
    /// Joint columns to keep after the leading strip; `None` keeps all.
    pub select: Option<Vec<usize>>,
}

impl HistogramOptions {
    pub fn new(measure: Measure, width: f64, config: &AnalysisConfig) -> Self {
        Self {
            measure,
            width,
            upper_bound: config.upper_bound,
            sample_rate: config.sample_rate_hz,
            dim: config.dim,
            skip_leading_columns: config.skip_leading_columns,
            select: None,
        }
    }

    pub fn with_select(mut self, select: Option<Vec<usize>>) -> Self {
        self.select = select;
        self
    }

    pub fn grid(&self) -> std::result::Result<BinGrid, HistogramError> {
        BinGrid::new(self.width, self.upper_bound)
    }
}

/// Report file name, e.g. `hmd_vel_1.csv`.
pub fn report_file_name(measure: Measure, width: f64) -> String {
    format!("hmd_{}_{}.csv", measure.short_name(), width)
}

/// Derivative field of one feature array after column stripping and selection.
pub fn derivative_field(path: &Path, options: &HistogramOptions) -> Result<DerivativeField> {
    let array = load_feature_array(path)
        .with_context(|| format!("Failed to load feature array: {}", path.display()))?;

    let skip = options.skip_leading_columns;
    if array.num_columns() < skip {
        return Err(HistogramError::TooFewColumns {
            columns: array.num_columns(),
            skip,
        })
        .with_context(|| path.display().to_string());
    }

    let data = array.view();
    let stripped = data.slice(s![.., skip..]);
    let field = options
        .measure
        .compute(stripped, options.dim, options.sample_rate)
        .map_err(HistogramError::from)
        .with_context(|| format!("Failed to compute {} for {}", options.measure, path.display()))?;

    match &options.select {
        Some(indices) => {
            if let Some(&index) = indices.iter().find(|&&i| i >= field.ncols()) {
                return Err(HistogramError::InvalidSelection {
                    index,
                    num_joints: field.ncols(),
                }
                .into());
            }
            Ok(field.select(Axis(1), indices))
        }
        None => Ok(field),
    }
}

/// Histogram of every `.npy` array in `cond_dir`.
///
/// Files are processed in parallel and their histograms summed, which counts
/// exactly the samples of the concatenated derivative fields.
pub fn condition_histogram(
    cond_dir: &Path,
    name: &str,
    options: &HistogramOptions,
) -> Result<(Histogram, usize)> {
    let grid = options.grid()?;

    let files = find_files(cond_dir, "npy");
    if files.is_empty() {
        return Err(HistogramError::EmptyCondition {
            name: name.to_string(),
            dir: cond_dir.to_path_buf(),
        }
        .into());
    }

    let fields = files
        .par_iter()
        .map(|file| derivative_field(file, options))
        .collect::<Result<Vec<_>>>()?;

    let num_joints = fields[0].ncols();
    for (file, field) in files.iter().zip(fields.iter()) {
        if field.ncols() != num_joints {
            return Err(HistogramError::JointCountMismatch {
                expected: num_joints,
                actual: field.ncols(),
            })
            .with_context(|| format!("Inconsistent joint count in {}", file.display()));
        }
    }

    let histogram = fields
        .par_iter()
        .map(|field| {
            let mut partial = Histogram::new(grid.clone(), num_joints);
            partial.add_field(field)?;
            Ok::<_, HistogramError>(partial)
        })
        .try_reduce(|| Histogram::new(grid.clone(), num_joints), |a, b| a.merge(b))?;

    Ok((histogram, files.len()))
}

/// Result of processing one condition.
#[derive(Debug, Clone)]
pub struct ConditionReport {
    pub name: String,
    pub histogram: Histogram,
    /// Joint column labels, without the aggregate column.
    pub joint_labels: Vec<String>,
    pub csv_path: PathBuf,
    pub num_files: usize,
}

/// Build, print and persist the histogram of one condition.
///
/// The report is written to `out_dir/<name>/hmd_<vel|acc>_<width>.csv`. When a
/// plot is given, the condition's normalized total is added to it as one
/// labelled curve.
pub fn make_histogram(
    coords_dir: &Path,
    name: &str,
    out_dir: &Path,
    options: &HistogramOptions,
    plot: Option<&mut FrequencyPlot>,
) -> Result<ConditionReport> {
    let cond_dir = coords_dir.join(name);
    let (histogram, num_files) = condition_histogram(&cond_dir, name, options)?;

    let joint_labels: Vec<String> = match &options.select {
        Some(indices) => indices.iter().map(|i| i.to_string()).collect(),
        None => (0..histogram.num_joints()).map(|i| i.to_string()).collect(),
    };

    let total = histogram.total();
    let mut labels = joint_labels.clone();
    labels.push(TOTAL_LABEL.to_string());
    let mut columns: Vec<Vec<u64>> = (0..histogram.num_joints())
        .map(|j| histogram.joint_counts(j).to_vec())
        .collect();
    columns.push(total.clone());

    let csv_path = out_dir
        .join(name)
        .join(report_file_name(options.measure, options.width));
    write_histogram_csv(&csv_path, &labels, histogram.grid().lower_edges(), &columns)
        .with_context(|| format!("Failed to write report: {}", csv_path.display()))?;

    println!("HMD ({}):", options.measure);
    println!("bins: {:?}", histogram.grid().edges());
    println!("population: {:?}", total);

    if let Some(plot) = plot {
        plot.add_curve(name, histogram.grid().lower_edges(), &total);
    }

    info!(
        "Condition '{}': {} files, {} samples -> {}",
        name,
        num_files,
        histogram.population(),
        csv_path.display()
    );

    Ok(ConditionReport {
        name: name.to_string(),
        histogram,
        joint_labels,
        csv_path,
        num_files,
    })
}

/// Sorted, non-hidden subdirectories of `coords_dir`.
pub fn list_conditions(coords_dir: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(coords_dir)
        .map_err(|_| HistogramError::NoConditions(coords_dir.to_path_buf()))?;

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| !name.starts_with('.'))
        .collect();

    if names.is_empty() {
        return Err(HistogramError::NoConditions(coords_dir.to_path_buf()).into());
    }

    names.sort();
    Ok(names)
}

/// Histogram every condition under `coords_dir`.
///
/// The bin grid is validated before anything is read from disk.
/// Conditions without feature arrays are warned about and skipped; any other
/// failure aborts the run.
pub fn analyze_conditions(
    coords_dir: &Path,
    measure: Measure,
    width: f64,
    out_dir: &Path,
    config: &AnalysisConfig,
    select: Option<Vec<usize>>,
    mut plot: Option<&mut FrequencyPlot>,
) -> Result<Vec<ConditionReport>> {
    let options = HistogramOptions::new(measure, width, config).with_select(select);
    options.grid()?;

    let conditions = list_conditions(coords_dir)?;

    let mut reports = Vec::with_capacity(conditions.len());
    for name in conditions {
        println!("\nConsider {}", name);
        match make_histogram(coords_dir, &name, out_dir, &options, plot.as_deref_mut()) {
            Ok(report) => reports.push(report),
            Err(e) => match e.downcast_ref::<HistogramError>() {
                Some(HistogramError::EmptyCondition { .. }) => {
                    warn!("Skipping condition '{}': {}", name, e);
                }
                _ => return Err(e),
            },
        }
    }

    Ok(reports)
}

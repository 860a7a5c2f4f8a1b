//! Data writers for `.npy` arrays, YAML artifacts and CSV reports.
//!
//! All writers create missing parent directories and report the offending
//! path on failure.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use ndarray_npy::{write_npy, WriteNpyError};
use serde::Serialize;
use thiserror::Error;

use super::loaders::FeatureArray;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// NPY writing error.
    #[error("NPY write error for '{path}': {source}")]
    NpyError {
        path: String,
        #[source]
        source: WriteNpyError,
    },

    /// YAML serialization error.
    #[error("YAML write error for '{path}': {source}")]
    YamlError {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// Mismatched array lengths.
    #[error("length mismatch: {expected} bins but column {column} has {actual} counts")]
    LengthMismatch {
        column: usize,
        expected: usize,
        actual: usize,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Write a feature array as a `.npy` file of `f64`.
///
/// # Example
///
/// ```no_run
/// use mocap_pipeline::core::loaders::FeatureArray;
/// use mocap_pipeline::core::writers::write_feature_array;
/// use std::path::Path;
///
/// let array = FeatureArray::new(ndarray::Array2::zeros((10, 6)));
/// write_feature_array(Path::new("take_01.npy"), &array).unwrap();
/// ```
pub fn write_feature_array(path: &Path, array: &FeatureArray) -> Result<()> {
    ensure_parent_dirs(path)?;
    write_npy(path, array.data()).map_err(|e| WriteError::NpyError {
        path: path.display().to_string(),
        source: e,
    })
}

/// Serialize any value to a YAML file.
pub fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent_dirs(path)?;
    let path_str = path.display().to_string();

    let content = serde_yaml::to_string(value).map_err(|e| WriteError::YamlError {
        path: path_str.clone(),
        source: e,
    })?;

    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path_str.clone(),
        source: e,
    })?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(content.as_bytes())
        .and_then(|_| writer.flush())
        .map_err(|e| WriteError::WriteFile {
            path: path_str,
            source: e,
        })
}

/// Write a histogram table to CSV.
///
/// The header is an empty cell followed by `labels`. Each row holds a bin's
/// lower edge followed by one count per column.
///
/// # Arguments
///
/// * `path` - Output file path (parent directories will be created if needed)
/// * `labels` - Column labels, one per entry of `columns`
/// * `edges` - Lower edge of each bin
/// * `columns` - Counts per column, each with one entry per bin
///
/// # Errors
///
/// Returns an error if a column length differs from `edges`, or if the file
/// cannot be created or written to.
pub fn write_histogram_csv(
    path: &Path,
    labels: &[String],
    edges: &[f64],
    columns: &[Vec<u64>],
) -> Result<()> {
    for (column, counts) in columns.iter().enumerate() {
        if counts.len() != edges.len() {
            return Err(WriteError::LengthMismatch {
                column,
                expected: edges.len(),
                actual: counts.len(),
            });
        }
    }

    ensure_parent_dirs(path)?;

    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    let mut csv_writer = csv::Writer::from_writer(BufWriter::new(file));

    let path_str = path.display().to_string();

    let header: Vec<&str> = std::iter::once("")
        .chain(labels.iter().map(String::as_str))
        .collect();
    csv_writer
        .write_record(&header)
        .map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;

    for (bin, edge) in edges.iter().enumerate() {
        let row: Vec<String> = std::iter::once(edge.to_string())
            .chain(columns.iter().map(|c| c[bin].to_string()))
            .collect();
        csv_writer
            .write_record(&row)
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

//! Configuration types for the motion-capture pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// How selected joints are turned into numeric columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterizationMode {
    /// World-space joint position (x, y, z) via forward kinematics.
    #[default]
    Position,
}

/// Configuration for BVH feature extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Output frame rate in frames per second
    #[serde(default = "default_target_fps")]
    pub target_fps: f64,

    /// Joints to export, looked up by name in the source skeleton
    #[serde(default = "default_target_joints")]
    pub target_joints: Vec<String>,

    /// Keep the root joint's translation channels
    #[serde(default)]
    pub include_root: bool,

    /// Parameterization of the selected joints
    #[serde(default)]
    pub mode: ParameterizationMode,
}

fn default_target_fps() -> f64 {
    30.0
}

/// Upper body with fingers, plus the world and root transforms.
fn default_target_joints() -> Vec<String> {
    [
        "p_r_scap", "p_l_scap", "body_world", "b_root", "b_spine0", "b_spine1", "b_spine2",
        "b_spine3", "b_l_shoulder", "b_l_arm", "b_l_arm_twist", "b_l_forearm",
        "b_l_wrist_twist", "b_l_wrist", "b_l_pinky1", "b_l_pinky2", "b_l_pinky3", "b_l_ring1",
        "b_l_ring2", "b_l_ring3", "b_l_middle1", "b_l_middle2", "b_l_middle3", "b_l_index1",
        "b_l_index2", "b_l_index3", "b_l_thumb0", "b_l_thumb1", "b_l_thumb2", "b_l_thumb3",
        "b_r_shoulder", "b_r_arm", "b_r_arm_twist", "b_r_forearm", "b_r_wrist_twist",
        "b_r_wrist", "b_r_thumb0", "b_r_thumb1", "b_r_thumb2", "b_r_thumb3", "b_r_pinky1",
        "b_r_pinky2", "b_r_pinky3", "b_r_middle1", "b_r_middle2", "b_r_middle3", "b_r_ring1",
        "b_r_ring2", "b_r_ring3", "b_r_index1", "b_r_index2", "b_r_index3", "b_neck0", "b_head",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            target_fps: default_target_fps(),
            target_joints: default_target_joints(),
            include_root: false,
            mode: ParameterizationMode::Position,
        }
    }
}

/// Configuration for kinematic statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Sampling rate of the feature arrays in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate_hz: f64,

    /// Coordinates per joint
    #[serde(default = "default_dim")]
    pub dim: usize,

    /// Leading columns dropped before differencing (fixed hip joints)
    #[serde(default = "default_skip_leading_columns")]
    pub skip_leading_columns: usize,

    /// Upper bound of the histogram bin grid
    #[serde(default = "default_upper_bound")]
    pub upper_bound: f64,

    /// Default histogram bin width
    #[serde(default = "default_bin_width")]
    pub bin_width: f64,
}

fn default_sample_rate() -> f64 {
    30.0
}

fn default_dim() -> usize {
    3
}

fn default_skip_leading_columns() -> usize {
    8
}

fn default_upper_bound() -> f64 {
    49.0
}

fn default_bin_width() -> f64 {
    1.0
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: default_sample_rate(),
            dim: default_dim(),
            skip_leading_columns: default_skip_leading_columns(),
            upper_bound: default_upper_bound(),
            bin_width: default_bin_width(),
        }
    }
}

/// Configuration for the frequency plot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotConfig {
    /// Image width in pixels
    #[serde(default = "default_plot_width")]
    pub width: u32,

    /// Image height in pixels
    #[serde(default = "default_plot_height")]
    pub height: u32,
}

fn default_plot_width() -> u32 {
    1280
}

fn default_plot_height() -> u32 {
    720
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            width: default_plot_width(),
            height: default_plot_height(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub plot: PlotConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_extraction_config() {
        let config = ExtractionConfig::default();
        assert_eq!(config.target_fps, 30.0);
        assert!(!config.include_root);
        assert_eq!(config.target_joints.len(), 54);
        assert_eq!(config.target_joints.first().map(String::as_str), Some("p_r_scap"));
        assert_eq!(config.mode, ParameterizationMode::Position);
    }

    #[test]
    fn test_default_pipeline_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.analysis.dim, 3);
        assert_eq!(config.analysis.skip_leading_columns, 8);
        assert_eq!(config.analysis.upper_bound, 49.0);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "analysis:\n  sample_rate_hz: 60.0\nextraction:\n  target_joints: [hips, head]\n";
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.analysis.sample_rate_hz, 60.0);
        assert_eq!(config.analysis.bin_width, 1.0);
        assert_eq!(config.extraction.target_joints, vec!["hips", "head"]);
        assert_eq!(config.extraction.target_fps, 30.0);
    }

    #[test]
    fn test_yaml_round_trip_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pipeline.yaml");

        let mut config = PipelineConfig::default();
        config.analysis.upper_bound = 20.0;
        config.to_yaml(&path).unwrap();

        let loaded = PipelineConfig::from_yaml(&path).unwrap();
        assert_eq!(loaded.analysis.upper_bound, 20.0);
        assert_eq!(loaded.extraction.mode, ParameterizationMode::Position);
    }
}

//! Data loaders for BVH motion files and `.npy` feature arrays.
//!
//! This module provides:
//! - The in-memory motion model (`Skeleton`, `Joint`, `RawMotion`)
//! - The `MotionParser` capability trait and its BVH implementation
//! - `FeatureArray`, the fixed-layout position array written per recording
//! - Directory scanning helpers shared by both pipelines

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayD, ArrayView2};
use ndarray_npy::{read_npy, ReadNpyError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("NPY read error: {0}")]
    Npy(#[from] ReadNpyError),

    #[error("Invalid BVH file: {0}")]
    InvalidBvh(String),

    #[error("Frame {frame} has {actual} channel values, expected {expected}")]
    ChannelCount {
        frame: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Header declares {declared} frames, found {actual}")]
    FrameCountMismatch { declared: usize, actual: usize },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Feature array must have at least one axis, got shape {0:?}")]
    InvalidShape(Vec<usize>),

    #[error("Reshape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// A single BVH channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Xposition,
    Yposition,
    Zposition,
    Xrotation,
    Yrotation,
    Zrotation,
}

impl Channel {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "Xposition" => Some(Self::Xposition),
            "Yposition" => Some(Self::Yposition),
            "Zposition" => Some(Self::Zposition),
            "Xrotation" => Some(Self::Xrotation),
            "Yrotation" => Some(Self::Yrotation),
            "Zrotation" => Some(Self::Zrotation),
            _ => None,
        }
    }

    /// Returns true for translation channels.
    #[inline]
    pub fn is_position(self) -> bool {
        matches!(self, Self::Xposition | Self::Yposition | Self::Zposition)
    }

    /// Axis index (0 = x, 1 = y, 2 = z).
    #[inline]
    pub fn axis(self) -> usize {
        match self {
            Self::Xposition | Self::Xrotation => 0,
            Self::Yposition | Self::Yrotation => 1,
            Self::Zposition | Self::Zrotation => 2,
        }
    }
}

/// One node of the skeleton hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    pub name: String,
    /// Index of the parent joint; `None` for the root.
    pub parent: Option<usize>,
    /// Rest offset relative to the parent.
    pub offset: [f64; 3],
    /// Animated channels in file order.
    pub channels: Vec<Channel>,
}

/// Joint hierarchy in declaration order (parents always precede children).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Skeleton {
    pub joints: Vec<Joint>,
}

impl Skeleton {
    /// Returns the number of joints, including end sites.
    #[inline]
    pub fn len(&self) -> usize {
        self.joints.len()
    }

    /// Returns true if the skeleton has no joints.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    /// Total number of channel values per frame.
    pub fn num_channels(&self) -> usize {
        self.joints.iter().map(|j| j.channels.len()).sum()
    }

    /// Index of the first channel of each joint within a frame row.
    pub fn channel_offsets(&self) -> Vec<usize> {
        let mut offsets = Vec::with_capacity(self.joints.len());
        let mut acc = 0;
        for joint in &self.joints {
            offsets.push(acc);
            acc += joint.channels.len();
        }
        offsets
    }

    /// Looks up a joint index by name.
    pub fn joint_index(&self, name: &str) -> Option<usize> {
        self.joints.iter().position(|j| j.name == name)
    }

    /// Canonical ordered joint names.
    pub fn topology(&self) -> JointTopology {
        JointTopology::new(self.joints.iter().map(|j| j.name.clone()).collect())
    }
}

/// A parsed motion recording: skeleton plus per-frame channel values.
#[derive(Debug, Clone)]
pub struct RawMotion {
    pub skeleton: Skeleton,
    /// Seconds between frames.
    pub frame_time: f64,
    /// One row of channel values per frame, in skeleton channel order.
    pub frames: Vec<Vec<f64>>,
    /// Source file path.
    pub source_path: Option<PathBuf>,
}

impl RawMotion {
    #[inline]
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Frames per second.
    #[inline]
    pub fn frame_rate(&self) -> f64 {
        1.0 / self.frame_time
    }
}

/// Ordered set of joint names defining the column layout of a feature array.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JointTopology {
    names: Vec<String>,
}

impl JointTopology {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    #[inline]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}

/// Dense (frames, joints × 3) position array for one recording.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureArray {
    data: Array2<f64>,
}

impl FeatureArray {
    pub fn new(data: Array2<f64>) -> Self {
        Self { data }
    }

    /// Builds an array from per-frame joint positions.
    ///
    /// Every frame must hold the same number of joints; the column count is
    /// taken from the first frame.
    pub fn from_positions(frames: &[Vec<[f64; 3]>]) -> Self {
        let num_joints = frames.first().map_or(0, |f| f.len());
        let mut data = Array2::zeros((frames.len(), num_joints * 3));
        for (i, frame) in frames.iter().enumerate() {
            for (j, pos) in frame.iter().take(num_joints).enumerate() {
                data[[i, j * 3]] = pos[0];
                data[[i, j * 3 + 1]] = pos[1];
                data[[i, j * 3 + 2]] = pos[2];
            }
        }
        Self { data }
    }

    /// Flattens an array of any rank >= 1 to `(shape[0], rest)`.
    pub fn from_dyn(data: ArrayD<f64>) -> Result<Self> {
        let shape = data.shape().to_vec();
        let (&frames, rest) = shape
            .split_first()
            .ok_or_else(|| LoaderError::InvalidShape(shape.clone()))?;
        let columns = rest.iter().product::<usize>();

        let data = data
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order((frames, columns))?;
        Ok(Self { data })
    }

    #[inline]
    pub fn num_frames(&self) -> usize {
        self.data.nrows()
    }

    #[inline]
    pub fn num_columns(&self) -> usize {
        self.data.ncols()
    }

    #[inline]
    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    #[inline]
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn into_inner(self) -> Array2<f64> {
        self.data
    }
}

/// Capability for turning a motion file into a `RawMotion`.
pub trait MotionParser: Send + Sync {
    fn parse(&self, path: &Path) -> Result<RawMotion>;
}

/// Parser for Biovision Hierarchy (`.bvh`) files.
#[derive(Debug, Clone, Copy, Default)]
pub struct BvhParser;

impl MotionParser for BvhParser {
    fn parse(&self, path: &Path) -> Result<RawMotion> {
        load_bvh(path)
    }
}

/// Load a BVH motion file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a well-formed BVH.
pub fn load_bvh<P: AsRef<Path>>(path: P) -> Result<RawMotion> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let mut motion = parse_bvh(&content)?;
    motion.source_path = Some(path.to_path_buf());
    Ok(motion)
}

/// Parse BVH text into a `RawMotion`.
///
/// `End Site` blocks become channel-less joints named `<parent>_Nub`.
pub fn parse_bvh(content: &str) -> Result<RawMotion> {
    let mut hierarchy = String::new();
    let mut lines = content.lines();
    let mut found_motion = false;

    for line in &mut lines {
        if line.trim() == "MOTION" {
            found_motion = true;
            break;
        }
        hierarchy.push_str(line);
        hierarchy.push('\n');
    }

    if !found_motion {
        return Err(LoaderError::InvalidBvh("Missing MOTION section".to_string()));
    }

    let skeleton = parse_hierarchy(&hierarchy)?;
    let num_channels = skeleton.num_channels();

    let mut lines = lines.map(str::trim).filter(|l| !l.is_empty());

    let declared = lines
        .next()
        .and_then(|l| l.strip_prefix("Frames:"))
        .ok_or_else(|| LoaderError::InvalidBvh("Missing 'Frames:' line".to_string()))?
        .trim()
        .parse::<usize>()
        .map_err(|e| LoaderError::ParseError(format!("Invalid frame count: {}", e)))?;

    let frame_time = lines
        .next()
        .and_then(|l| l.strip_prefix("Frame Time:"))
        .ok_or_else(|| LoaderError::InvalidBvh("Missing 'Frame Time:' line".to_string()))?
        .trim()
        .parse::<f64>()
        .map_err(|e| LoaderError::ParseError(format!("Invalid frame time: {}", e)))?;

    if !(frame_time > 0.0) || !frame_time.is_finite() {
        return Err(LoaderError::InvalidBvh(format!(
            "Frame time must be positive, got {}",
            frame_time
        )));
    }

    let mut frames = Vec::with_capacity(declared);
    for (frame, line) in lines.enumerate() {
        let values = line
            .split_whitespace()
            .map(|v| {
                v.parse::<f64>()
                    .map_err(|_| LoaderError::ParseError(format!("Invalid channel value: {}", v)))
            })
            .collect::<Result<Vec<f64>>>()?;

        if values.len() != num_channels {
            return Err(LoaderError::ChannelCount {
                frame,
                expected: num_channels,
                actual: values.len(),
            });
        }
        frames.push(values);
    }

    if frames.len() != declared {
        return Err(LoaderError::FrameCountMismatch {
            declared,
            actual: frames.len(),
        });
    }

    Ok(RawMotion {
        skeleton,
        frame_time,
        frames,
        source_path: None,
    })
}

fn next_token<'a, I: Iterator<Item = &'a str>>(tokens: &mut I, what: &str) -> Result<&'a str> {
    tokens
        .next()
        .ok_or_else(|| LoaderError::InvalidBvh(format!("Unexpected end of hierarchy, expected {}", what)))
}

fn expect_token<'a, I: Iterator<Item = &'a str>>(tokens: &mut I, expected: &str) -> Result<()> {
    let tok = next_token(tokens, expected)?;
    if tok != expected {
        return Err(LoaderError::InvalidBvh(format!(
            "Expected '{}', found '{}'",
            expected, tok
        )));
    }
    Ok(())
}

fn parse_hierarchy(text: &str) -> Result<Skeleton> {
    let mut tokens = text.split_whitespace();
    expect_token(&mut tokens, "HIERARCHY")?;

    let mut joints: Vec<Joint> = Vec::new();
    let mut stack: Vec<usize> = Vec::new();

    while let Some(tok) = tokens.next() {
        match tok {
            "ROOT" | "JOINT" => {
                if tok == "ROOT" && !joints.is_empty() {
                    return Err(LoaderError::InvalidBvh("Multiple ROOT joints".to_string()));
                }
                if tok == "JOINT" && stack.is_empty() {
                    return Err(LoaderError::InvalidBvh("JOINT outside of ROOT".to_string()));
                }
                let name = next_token(&mut tokens, "joint name")?;
                joints.push(Joint {
                    name: name.to_string(),
                    parent: stack.last().copied(),
                    offset: [0.0; 3],
                    channels: Vec::new(),
                });
                expect_token(&mut tokens, "{")?;
                stack.push(joints.len() - 1);
            }
            "End" => {
                expect_token(&mut tokens, "Site")?;
                let parent = *stack
                    .last()
                    .ok_or_else(|| LoaderError::InvalidBvh("End Site outside of joint".to_string()))?;
                joints.push(Joint {
                    name: format!("{}_Nub", joints[parent].name),
                    parent: Some(parent),
                    offset: [0.0; 3],
                    channels: Vec::new(),
                });
                expect_token(&mut tokens, "{")?;
                stack.push(joints.len() - 1);
            }
            "OFFSET" => {
                let idx = *stack
                    .last()
                    .ok_or_else(|| LoaderError::InvalidBvh("OFFSET outside of joint".to_string()))?;
                for axis in 0..3 {
                    let value = next_token(&mut tokens, "offset value")?;
                    joints[idx].offset[axis] = value
                        .parse()
                        .map_err(|_| LoaderError::ParseError(format!("Invalid offset: {}", value)))?;
                }
            }
            "CHANNELS" => {
                let idx = *stack
                    .last()
                    .ok_or_else(|| LoaderError::InvalidBvh("CHANNELS outside of joint".to_string()))?;
                let count_str = next_token(&mut tokens, "channel count")?;
                let count: usize = count_str
                    .parse()
                    .map_err(|_| LoaderError::ParseError(format!("Invalid channel count: {}", count_str)))?;
                for _ in 0..count {
                    let name = next_token(&mut tokens, "channel name")?;
                    let channel = Channel::parse(name)
                        .ok_or_else(|| LoaderError::InvalidBvh(format!("Unknown channel '{}'", name)))?;
                    joints[idx].channels.push(channel);
                }
            }
            "}" => {
                stack
                    .pop()
                    .ok_or_else(|| LoaderError::InvalidBvh("Unbalanced '}'".to_string()))?;
            }
            other => {
                return Err(LoaderError::InvalidBvh(format!("Unexpected token '{}'", other)));
            }
        }
    }

    if !stack.is_empty() {
        return Err(LoaderError::InvalidBvh("Unclosed joint block".to_string()));
    }
    if joints.is_empty() {
        return Err(LoaderError::InvalidBvh("No ROOT joint".to_string()));
    }

    Ok(Skeleton { joints })
}

/// Load a feature array from a `.npy` file.
///
/// Accepts `f64` or `f32` data of any rank >= 1. The first axis is frames;
/// all remaining axes are flattened into columns, so a `(frames, joints, 3)`
/// array yields `(frames, joints * 3)`.
pub fn load_feature_array<P: AsRef<Path>>(path: P) -> Result<FeatureArray> {
    let path = path.as_ref();
    let data: ArrayD<f64> = match read_npy::<_, ArrayD<f64>>(path) {
        Ok(data) => data,
        Err(ReadNpyError::WrongDescriptor(_)) => read_npy::<_, ArrayD<f32>>(path)?.mapv(f64::from),
        Err(e) => return Err(e.into()),
    };
    FeatureArray::from_dyn(data)
}

/// List files in `dir` with the given extension (case-insensitive), sorted.
///
/// A missing or unreadable directory yields an empty list.
pub fn find_files(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .map(|ext| ext.eq_ignore_ascii_case(extension))
                .unwrap_or(false)
        })
        .collect();

    files.sort();
    files
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    pub(crate) const SIMPLE_BVH: &str = "HIERARCHY
ROOT hips
{
  OFFSET 0.0 0.0 0.0
  CHANNELS 6 Xposition Yposition Zposition Zrotation Xrotation Yrotation
  JOINT spine
  {
    OFFSET 0.0 10.0 0.0
    CHANNELS 3 Zrotation Xrotation Yrotation
    JOINT head
    {
      OFFSET 0.0 5.0 0.0
      CHANNELS 3 Zrotation Xrotation Yrotation
      End Site
      {
        OFFSET 0.0 2.0 0.0
      }
    }
  }
}
MOTION
Frames: 4
Frame Time: 0.0166667
1.0 2.0 3.0 0.0 0.0 0.0 0.0 0.0 0.0 0.0 0.0 0.0
2.0 2.0 3.0 0.0 0.0 0.0 0.0 0.0 0.0 0.0 0.0 0.0
3.0 2.0 3.0 0.0 0.0 0.0 90.0 0.0 0.0 0.0 0.0 0.0
4.0 2.0 3.0 0.0 0.0 0.0 0.0 0.0 0.0 0.0 0.0 0.0
";

    #[test]
    fn test_parse_bvh_hierarchy() -> Result<()> {
        let motion = parse_bvh(SIMPLE_BVH)?;
        let names: Vec<&str> = motion.skeleton.joints.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["hips", "spine", "head", "head_Nub"]);

        assert_eq!(motion.skeleton.joints[0].parent, None);
        assert_eq!(motion.skeleton.joints[1].parent, Some(0));
        assert_eq!(motion.skeleton.joints[3].parent, Some(2));
        assert_eq!(motion.skeleton.joints[1].offset, [0.0, 10.0, 0.0]);
        assert!(motion.skeleton.joints[3].channels.is_empty());
        assert_eq!(motion.skeleton.num_channels(), 12);
        assert_eq!(motion.skeleton.channel_offsets(), vec![0, 6, 9, 12]);
        Ok(())
    }

    #[test]
    fn test_parse_bvh_motion() -> Result<()> {
        let motion = parse_bvh(SIMPLE_BVH)?;
        assert_eq!(motion.num_frames(), 4);
        assert!((motion.frame_rate() - 60.0).abs() < 1e-3);
        assert_eq!(motion.frames[2][6], 90.0);
        Ok(())
    }

    #[test]
    fn test_parse_bvh_channel_count_mismatch() {
        let broken = SIMPLE_BVH.replace(
            "4.0 2.0 3.0 0.0 0.0 0.0 0.0 0.0 0.0 0.0 0.0 0.0",
            "4.0 2.0 3.0",
        );
        match parse_bvh(&broken) {
            Err(LoaderError::ChannelCount { frame, expected, actual }) => {
                assert_eq!(frame, 3);
                assert_eq!(expected, 12);
                assert_eq!(actual, 3);
            }
            other => panic!("Expected ChannelCount error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_bvh_frame_count_mismatch() {
        let broken = SIMPLE_BVH.replace("Frames: 4", "Frames: 5");
        assert!(matches!(
            parse_bvh(&broken),
            Err(LoaderError::FrameCountMismatch { declared: 5, actual: 4 })
        ));
    }

    #[test]
    fn test_parse_bvh_missing_motion() {
        let truncated: String = SIMPLE_BVH.split("MOTION").next().unwrap().to_string();
        assert!(matches!(parse_bvh(&truncated), Err(LoaderError::InvalidBvh(_))));
    }

    #[test]
    fn test_load_bvh_sets_source_path() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", SIMPLE_BVH).unwrap();
        file.flush().unwrap();

        let motion = BvhParser.parse(file.path())?;
        assert_eq!(motion.source_path.as_deref(), Some(file.path()));
        Ok(())
    }

    #[test]
    fn test_feature_array_from_positions() {
        let frames = vec![
            vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]],
            vec![[7.0, 8.0, 9.0], [10.0, 11.0, 12.0]],
        ];
        let array = FeatureArray::from_positions(&frames);
        assert_eq!(array.num_frames(), 2);
        assert_eq!(array.num_columns(), 6);
        assert_eq!(array.data()[[1, 3]], 10.0);
    }

    #[test]
    fn test_load_feature_array_flattens_joint_axis() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("take.npy");
        let data = ndarray::Array3::from_shape_fn((4, 2, 3), |(f, j, c)| (f * 100 + j * 10 + c) as f64);
        ndarray_npy::write_npy(&path, &data).unwrap();

        let array = load_feature_array(&path).unwrap();
        assert_eq!(array.data().dim(), (4, 6));
        assert_eq!(array.data()[[2, 4]], 211.0);
    }

    #[test]
    fn test_load_feature_array_f32() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("take.npy");
        let data = ndarray::array![[0.5f32, 1.0, 2.0], [3.0, 4.0, 5.25]];
        ndarray_npy::write_npy(&path, &data).unwrap();

        let array = load_feature_array(&path).unwrap();
        assert_eq!(array.data(), &ndarray::array![[0.5, 1.0, 2.0], [3.0, 4.0, 5.25]]);
    }

    #[test]
    fn test_from_dyn_rejects_scalar() {
        let scalar = ArrayD::<f64>::zeros(ndarray::IxDyn(&[]));
        assert!(matches!(
            FeatureArray::from_dyn(scalar),
            Err(LoaderError::InvalidShape(_))
        ));
    }

    #[test]
    fn test_find_files_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        for name in ["b.bvh", "a.BVH", "c.txt"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::create_dir(dir.path().join("d.bvh")).unwrap();

        let files = find_files(dir.path(), "bvh");
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.BVH", "b.bvh"]);
    }

    #[test]
    fn test_find_files_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert!(find_files(&dir.path().join("absent"), "npy").is_empty());
    }
}

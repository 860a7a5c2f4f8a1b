use std::fs;
use std::path::Path;

use approx::assert_relative_eq;
use mocap_pipeline::core::loaders::{load_feature_array, BvhParser};
use mocap_pipeline::core::transforms::PositionParameterizer;
use mocap_pipeline::core::writers::write_feature_array;
use mocap_pipeline::processors::extraction::{extract_directory, FITTED_TRANSFORM_FILE};
use mocap_pipeline::processors::histogram::analyze_conditions;
use mocap_pipeline::processors::kinematics::{compute_acceleration, compute_velocity, Measure};
use mocap_pipeline::processors::{FittedTransform, HistogramError, KinematicsError};
use mocap_pipeline::visualization::FrequencyPlot;
use mocap_pipeline::{AnalysisConfig, ExtractionConfig, FeatureArray};
use ndarray::Array2;
use tempfile::TempDir;

const WALK_BVH: &str = "HIERARCHY
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
    }
  }
}
MOTION
Frames: 8
Frame Time: 0.00833333
0 0 0 0 0 0 0 0 0 0 0 0
1 0 0 0 0 0 0 0 0 0 0 0
2 0 0 0 0 0 0 0 0 0 0 0
3 0 0 0 0 0 0 0 0 0 0 0
4 0 0 0 0 0 0 0 0 0 0 0
5 0 0 0 0 0 0 0 0 0 0 0
6 0 0 0 0 0 0 0 0 0 0 0
7 0 0 0 0 0 0 0 0 0 0 0
";

/// One joint per entry of `speeds`, each moving along x so that its
/// velocity at 1 Hz equals the given speeds.
fn positions_with_speeds(speeds: &[&[f64]]) -> Array2<f64> {
    let frames = speeds[0].len() + 1;
    let mut data = Array2::zeros((frames, speeds.len() * 3));
    for (joint, joint_speeds) in speeds.iter().enumerate() {
        let mut x = 0.0;
        for (i, speed) in joint_speeds.iter().enumerate() {
            x += speed;
            data[[i + 1, joint * 3]] = x;
        }
    }
    data
}

fn read_report(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let header = reader.headers().unwrap().iter().map(String::from).collect();
    let rows = reader
        .records()
        .map(|r| r.unwrap().iter().map(String::from).collect())
        .collect();
    (header, rows)
}

fn unit_config() -> AnalysisConfig {
    AnalysisConfig {
        sample_rate_hz: 1.0,
        skip_leading_columns: 0,
        ..AnalysisConfig::default()
    }
}

#[test]
fn test_constant_motion_velocity_and_histogram() {
    let dir = TempDir::new().unwrap();
    let coords = dir.path().join("coords");
    let out = dir.path().join("out");

    // 8 leading metadata columns, then joint 0 stepping one unit along x and a fixed joint 1
    let mut data = Array2::zeros((4, 14));
    for i in 0..4 {
        data[[i, 8]] = i as f64;
        data[[i, 11]] = 2.0;
        data[[i, 12]] = 3.0;
    }

    let vel = compute_velocity(data.slice(ndarray::s![.., 8..]), 3, 30.0).unwrap();
    assert_eq!(vel.dim(), (3, 2));
    for i in 0..3 {
        assert_relative_eq!(vel[[i, 0]], 30.0);
        assert_eq!(vel[[i, 1]], 0.0);
    }

    let array = FeatureArray::new(data);
    write_feature_array(&coords.join("GT").join("take_01.npy"), &array).unwrap();
    write_feature_array(&coords.join("GT").join("take_02.npy"), &array).unwrap();

    let reports = analyze_conditions(
        &coords,
        Measure::Velocity,
        1.0,
        &out,
        &AnalysisConfig::default(),
        None,
        None,
    )
    .unwrap();

    assert_eq!(reports.len(), 1);
    let histogram = &reports[0].histogram;
    assert_eq!(reports[0].num_files, 2);
    assert_eq!(histogram.joint_counts(0)[30], 6);
    assert_eq!(histogram.joint_counts(1)[0], 6);
    assert_eq!(histogram.population(), 12);
    assert!(out.join("GT").join("hmd_vel_1.csv").exists());
}

#[test]
fn test_acceleration_of_increasing_steps() {
    let data = positions_with_speeds(&[&[1.0, 1.0, 2.0, 3.0]]);
    let acc = compute_acceleration(data.view(), 3, 30.0).unwrap();

    assert_eq!(acc.dim(), (3, 1));
    assert_relative_eq!(acc[[0, 0]], 0.0);
    assert_relative_eq!(acc[[1, 0]], 900.0);
}

#[test]
fn test_two_conditions_share_bins_and_totals() {
    let dir = TempDir::new().unwrap();
    let coords = dir.path().join("coords");
    let out = dir.path().join("out");

    let gt = positions_with_speeds(&[&[0.5, 1.0, 2.5], &[0.0, 0.0, 1.0]]);
    let m1 = positions_with_speeds(&[&[3.0, 3.0], &[40.0, 49.0]]);
    write_feature_array(&coords.join("GT").join("a.npy"), &FeatureArray::new(gt)).unwrap();
    write_feature_array(&coords.join("M1").join("a.npy"), &FeatureArray::new(m1)).unwrap();
    fs::create_dir_all(coords.join(".DS_Store")).unwrap();

    let mut plot = FrequencyPlot::new(Measure::Velocity);
    let reports = analyze_conditions(
        &coords,
        Measure::Velocity,
        1.0,
        &out,
        &unit_config(),
        None,
        Some(&mut plot),
    )
    .unwrap();

    let names: Vec<&str> = reports.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["GT", "M1"]);
    assert_eq!(plot.curves().len(), 2);

    let (gt_header, gt_rows) = read_report(&out.join("GT").join("hmd_vel_1.csv"));
    let (m1_header, m1_rows) = read_report(&out.join("M1").join("hmd_vel_1.csv"));

    assert_eq!(gt_header, vec!["", "0", "1", "Total"]);
    assert_eq!(gt_header, m1_header);
    assert_eq!(gt_rows.len(), 49);

    let gt_edges: Vec<&String> = gt_rows.iter().map(|r| &r[0]).collect();
    let m1_edges: Vec<&String> = m1_rows.iter().map(|r| &r[0]).collect();
    assert_eq!(gt_edges, m1_edges);

    for row in gt_rows.iter().chain(m1_rows.iter()) {
        let joint_sum: u64 = row[1..3].iter().map(|v| v.parse::<u64>().unwrap()).sum();
        assert_eq!(row[3].parse::<u64>().unwrap(), joint_sum);
    }

    let gt_total: Vec<u64> = gt_rows.iter().map(|r| r[3].parse().unwrap()).collect();
    assert_eq!(&gt_total[..3], &[3, 2, 1]);
    assert_eq!(gt_total[3..].iter().sum::<u64>(), 0);

    // 49.0 lies on the closing edge and is not counted
    let m1_hist = &reports[1].histogram;
    assert_eq!(m1_hist.joint_counts(0)[3], 2);
    assert_eq!(m1_hist.joint_counts(1)[40], 1);
    assert_eq!(m1_hist.population(), 3);
}

#[test]
fn test_unknown_measure_rejected() {
    match "jerk".parse::<Measure>() {
        Err(KinematicsError::UnknownMeasure(name)) => assert_eq!(name, "jerk"),
        other => panic!("Expected UnknownMeasure, got {:?}", other),
    }
}

#[test]
fn test_invalid_width_rejected_before_io() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");

    let err = analyze_conditions(
        &dir.path().join("missing"),
        Measure::Velocity,
        0.0,
        &out,
        &AnalysisConfig::default(),
        None,
        None,
    )
    .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<HistogramError>(),
        Some(HistogramError::InvalidGrid { .. })
    ));
    assert!(!out.exists());
}

#[test]
fn test_three_dimensional_f32_condition() {
    let dir = TempDir::new().unwrap();
    let coords = dir.path().join("coords");
    let cond = coords.join("GEN");
    fs::create_dir_all(&cond).unwrap();

    // (frames, joints, 3) in f32, joint 0 stepping one unit along x per frame
    let data = ndarray::Array3::<f32>::from_shape_fn((4, 2, 3), |(f, j, c)| {
        if j == 0 && c == 0 {
            f as f32
        } else {
            0.0
        }
    });
    ndarray_npy::write_npy(cond.join("gen.npy"), &data).unwrap();

    let config = AnalysisConfig {
        skip_leading_columns: 0,
        ..AnalysisConfig::default()
    };
    let reports = analyze_conditions(
        &coords,
        Measure::Velocity,
        1.0,
        &dir.path().join("out"),
        &config,
        None,
        None,
    )
    .unwrap();

    let histogram = &reports[0].histogram;
    assert_eq!(histogram.num_joints(), 2);
    assert_eq!(histogram.joint_counts(0)[30], 3);
    assert_eq!(histogram.joint_counts(1)[0], 3);
}

#[test]
fn test_missing_coords_dir() {
    let dir = TempDir::new().unwrap();
    let err = analyze_conditions(
        &dir.path().join("missing"),
        Measure::Velocity,
        1.0,
        &dir.path().join("out"),
        &AnalysisConfig::default(),
        None,
        None,
    )
    .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<HistogramError>(),
        Some(HistogramError::NoConditions(_))
    ));
}

#[test]
fn test_extraction_then_histogram() {
    let dir = TempDir::new().unwrap();
    let bvh_dir = dir.path().join("bvh");
    let dest_dir = dir.path().join("coords").join("GT");
    let pipe_dir = dir.path().join("utils");
    fs::create_dir_all(&bvh_dir).unwrap();
    fs::write(bvh_dir.join("walk_a.bvh"), WALK_BVH).unwrap();
    fs::write(bvh_dir.join("walk_b.bvh"), WALK_BVH).unwrap();
    fs::write(bvh_dir.join("notes.txt"), "not motion").unwrap();

    let config = ExtractionConfig {
        target_fps: 30.0,
        target_joints: vec!["hips".into(), "spine".into(), "head".into()],
        include_root: false,
        ..ExtractionConfig::default()
    };

    let summary = extract_directory(
        &bvh_dir,
        &dest_dir,
        &pipe_dir,
        &config,
        &BvhParser,
        &PositionParameterizer,
    )
    .unwrap();

    assert_eq!(summary.outputs.len(), 2);
    assert_eq!(summary.num_columns, 9);
    assert_eq!(summary.transform_path, pipe_dir.join(FITTED_TRANSFORM_FILE));

    let fitted = FittedTransform::load(&summary.transform_path).unwrap();
    assert_eq!(fitted.joints.names(), &["hips", "spine", "head"]);

    // 120 fps -> 30 fps keeps every fourth frame; the root stays locked
    let array = load_feature_array(dest_dir.join("walk_a.npy")).unwrap();
    assert_eq!(array.data().dim(), (2, 9));
    for row in array.data().rows() {
        assert_relative_eq!(row[0], 0.0);
        assert_relative_eq!(row[4], 10.0, epsilon = 1e-9);
        assert_relative_eq!(row[7], 15.0, epsilon = 1e-9);
    }

    let config = AnalysisConfig {
        skip_leading_columns: 0,
        ..AnalysisConfig::default()
    };
    let reports = analyze_conditions(
        &dir.path().join("coords"),
        Measure::Velocity,
        1.0,
        &dir.path().join("out"),
        &config,
        Some(vec![2]),
        None,
    )
    .unwrap();

    assert_eq!(reports[0].joint_labels, vec!["2"]);
    assert_eq!(reports[0].histogram.joint_counts(0)[0], 2);
}

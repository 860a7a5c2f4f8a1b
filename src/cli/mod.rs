//! Command-line interface for the motion-capture pipeline.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::core::loaders::BvhParser;
use crate::core::transforms::PositionParameterizer;
use crate::processors::histogram::HistogramError;
use crate::processors::kinematics::Measure;
use crate::visualization::FrequencyPlot;
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "mocap-pipeline")]
#[command(about = "Motion-capture feature extraction and kinematic statistics", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert BVH files to world-space joint position arrays (.npy)
    Extract {
        /// Path where source motion files (in BVH format) are stored
        #[arg(long = "bvh_dir", visible_alias = "orig")]
        bvh_dir: PathBuf,
        /// Path where extracted motion features will be stored
        #[arg(long = "dest_dir", visible_alias = "dest")]
        dest_dir: PathBuf,
        /// Path where the fitted processing pipeline will be stored
        #[arg(long = "pipeline_dir", visible_alias = "pipe", default_value = "./utils/")]
        pipeline_dir: PathBuf,
        /// Output frame rate (overrides config)
        #[arg(long)]
        fps: Option<f64>,
    },

    /// Calculate histograms of velocity or acceleration per condition
    Histogram {
        /// Directory holding one sub-directory of .npy files per condition
        #[arg(short = 'p', long = "coords_dir", default_value = "data")]
        coords_dir: PathBuf,
        /// Bin width of the histogram (overrides config)
        #[arg(short, long)]
        width: Option<f64>,
        /// Measure to calculate (velocity or acceleration)
        #[arg(short, long, default_value = "velocity")]
        measure: Measure,
        /// Joint subset to compute (if omitted, use all)
        #[arg(short, long, num_args = 1..)]
        select: Option<Vec<usize>>,
        /// Plot normalized frequencies of all conditions
        #[arg(short, long)]
        visualize: bool,
        /// Directory to output the result
        #[arg(long = "out_dir", default_value = "resulting")]
        out_dir: PathBuf,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            let head: String = value.chars().take(36).collect();
            format!("{}...", head)
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Extract { bvh_dir, dest_dir, pipeline_dir, fps } => {
            cmd_extract(&bvh_dir, &dest_dir, &pipeline_dir, fps, &config);
        }
        Commands::Histogram { coords_dir, width, measure, select, visualize, out_dir } => {
            cmd_histogram(&coords_dir, width, measure, select, visualize, &out_dir, &config);
        }
    }
}

fn cmd_extract(
    bvh_dir: &Path,
    dest_dir: &Path,
    pipeline_dir: &Path,
    fps: Option<f64>,
    config: &PipelineConfig,
) {
    use crate::processors::extraction;

    let start = Instant::now();

    let mut extraction_config = config.extraction.clone();
    if let Some(fps) = fps {
        extraction_config.target_fps = fps;
    }

    println!("Going to pre-process the motion files in {}", bvh_dir.display());
    println!("Output directory: {}", dest_dir.display());
    println!("Target frame rate: {}", extraction_config.target_fps);
    println!("Target joints: {}", extraction_config.target_joints.len());

    let spinner = create_spinner("Extracting joint positions...");

    match extraction::extract_directory(
        bvh_dir,
        dest_dir,
        pipeline_dir,
        &extraction_config,
        &BvhParser,
        &PositionParameterizer,
    ) {
        Ok(summary) => {
            spinner.finish_and_clear();

            print_summary(
                "Feature Extraction Complete",
                &[
                    ("Input directory", bvh_dir.display().to_string()),
                    ("Output directory", dest_dir.display().to_string()),
                    ("Files written", summary.outputs.len().to_string()),
                    ("Frames written", summary.num_frames.to_string()),
                    ("Columns per frame", summary.num_columns.to_string()),
                    ("Fitted transform", summary.transform_path.display().to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Extraction failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_histogram(
    coords_dir: &Path,
    width: Option<f64>,
    measure: Measure,
    select: Option<Vec<usize>>,
    visualize: bool,
    out_dir: &Path,
    config: &PipelineConfig,
) {
    use crate::processors::histogram;

    let start = Instant::now();
    let width = width.unwrap_or(config.analysis.bin_width);

    let mut plot = visualize.then(|| FrequencyPlot::new(measure));

    let reports = match histogram::analyze_conditions(
        coords_dir,
        measure,
        width,
        out_dir,
        &config.analysis,
        select,
        plot.as_mut(),
    ) {
        Ok(reports) => reports,
        Err(e) => {
            if let Some(HistogramError::NoConditions(_)) = e.downcast_ref::<HistogramError>() {
                eprintln!("{}", e);
            } else {
                error!("Histogram failed: {:#}", e);
            }
            std::process::exit(1);
        }
    };

    let mut plot_path = None;
    if let Some(plot) = plot.filter(|p| !p.is_empty()) {
        let path = out_dir.join(
            Path::new(&histogram::report_file_name(measure, width)).with_extension("png"),
        );
        match plot.render(&path, config.plot.width, config.plot.height) {
            Ok(()) => plot_path = Some(path),
            Err(e) => {
                error!("Visualization failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    println!("\nMore detailed result was written to the files in the {} folder", out_dir.display());

    print_summary(
        "Histogram Complete",
        &[
            ("Coords directory", coords_dir.display().to_string()),
            ("Measure", measure.to_string()),
            ("Bin width", width.to_string()),
            ("Conditions", reports.len().to_string()),
            (
                "Files",
                reports.iter().map(|r| r.num_files).sum::<usize>().to_string(),
            ),
            (
                "Plot",
                plot_path.map_or_else(|| "-".to_string(), |p| p.display().to_string()),
            ),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

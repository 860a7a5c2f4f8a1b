//! Frequency plots comparing conditions.
//!
//! A [`FrequencyPlot`] collects one normalized-frequency curve per condition
//! and is rendered once, so every condition of a run lands on the same axes.

use std::path::Path;

use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

use crate::processors::kinematics::Measure;

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error("No curves to plot")]
    EmptyPlot,
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

/// Line colors, cycled per curve.
const CURVE_COLORS: &[(u8, u8, u8)] = &[
    (55, 126, 184),  // Blue
    (228, 26, 28),   // Red
    (77, 175, 74),   // Green
    (152, 78, 163),  // Purple
    (255, 127, 0),   // Orange
    (166, 86, 40),   // Brown
    (247, 129, 191), // Pink
    (153, 153, 153), // Gray
    (0, 206, 209),   // Turquoise
];

/// One labelled curve of (bin lower edge, frequency) points.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyCurve {
    pub label: String,
    pub points: Vec<(f64, f64)>,
}

/// Accumulator for frequency curves sharing one figure.
#[derive(Debug, Clone)]
pub struct FrequencyPlot {
    title: String,
    x_label: String,
    curves: Vec<FrequencyCurve>,
}

impl FrequencyPlot {
    pub fn new(measure: Measure) -> Self {
        Self {
            title: format!("Frequencies of Moving Distance ({})", measure),
            x_label: measure.unit_label().to_string(),
            curves: Vec::new(),
        }
    }

    #[inline]
    pub fn curves(&self) -> &[FrequencyCurve] {
        &self.curves
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }

    /// Add a curve of `counts` normalized to sum to one.
    ///
    /// An all-zero histogram yields a flat zero curve.
    pub fn add_curve(&mut self, label: &str, lower_edges: &[f64], counts: &[u64]) {
        let sum: u64 = counts.iter().sum();
        let points = lower_edges
            .iter()
            .zip(counts.iter())
            .map(|(&edge, &count)| {
                let freq = if sum > 0 { count as f64 / sum as f64 } else { 0.0 };
                (edge, freq)
            })
            .collect();

        self.curves.push(FrequencyCurve {
            label: label.to_string(),
            points,
        });
    }

    /// Render all curves to a PNG file.
    pub fn render(&self, output_path: &Path, width: u32, height: u32) -> Result<()> {
        if self.curves.is_empty() {
            return Err(VisualizationError::EmptyPlot);
        }

        let (x_max, y_max) = self.bounds();

        let root = BitMapBackend::new(output_path, (width, height)).into_drawing_area();

        root.fill(&WHITE).map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

        let mut chart = ChartBuilder::on(&root)
            .caption(&self.title, ("sans-serif", 24))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(0.0..x_max, 0.0..y_max)
            .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

        chart
            .configure_mesh()
            .x_desc(self.x_label.as_str())
            .y_desc("Frequency")
            .draw()
            .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

        for (idx, curve) in self.curves.iter().enumerate() {
            let (r, g, b) = CURVE_COLORS[idx % CURVE_COLORS.len()];
            let color = RGBColor(r, g, b);
            chart
                .draw_series(LineSeries::new(curve.points.iter().copied(), color.stroke_width(2)))
                .map_err(|e| VisualizationError::PlottingError(e.to_string()))?
                .label(curve.label.clone())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
        }

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

        root.present().map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

        Ok(())
    }

    /// Axis ranges covering every curve, padded so flat curves stay visible.
    fn bounds(&self) -> (f64, f64) {
        let mut x_max = f64::MIN;
        let mut y_max = 0.0f64;

        for curve in &self.curves {
            for &(x, y) in &curve.points {
                x_max = x_max.max(x);
                y_max = y_max.max(y);
            }
        }

        if x_max <= 0.0 {
            x_max = 1.0;
        }
        if y_max <= 0.0 {
            y_max = 1.0;
        }

        (x_max, y_max * 1.05)
    }
}

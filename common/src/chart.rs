use std::{
    collections::HashSet,
    fs::read,
    ops::Range,
    path::{Path, PathBuf},
    sync::{LazyLock, Mutex, PoisonError},
};

use itertools::Itertools;
use plotters::{
    coord::{
        Shift,
        ranged1d::{DefaultFormatting, KeyPointHint, Ranged},
    },
    prelude::*,
    style::{FontStyle, register_font},
};
use plotters_backend::{
    DrawingBackend, DrawingErrorKind,
    text_anchor::{HPos, Pos, VPos},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::aggregate::ChunkMean;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Got {means} values but {labels} size labels")]
    LengthMismatch { means: usize, labels: usize },
    #[error("Invalid {field}: {reason}")]
    InvalidOption { field: &'static str, reason: String },
    #[error("Bar {index} has unplottable value {value}")]
    InvalidValue { index: usize, value: f64 },
    #[error("Unsupported chart output {0:?}, expected a .png or .svg path")]
    UnsupportedOutput(PathBuf),
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("Drawing {path:?} failed: {source}")]
    Backend {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Font: {0}")]
    Font(String),
}

/// Tried in order when no `font_file` is configured
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Largest accepted image side in pixels
pub const MAX_PIXELS: u32 = 16_384;

static REGISTERED_FONTS: LazyLock<Mutex<HashSet<String>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegendLocation {
    UpperLeft,
    UpperMiddle,
    #[default]
    UpperRight,
    MiddleLeft,
    MiddleMiddle,
    MiddleRight,
    LowerLeft,
    LowerMiddle,
    LowerRight,
}

impl From<LegendLocation> for SeriesLabelPosition {
    fn from(value: LegendLocation) -> Self {
        match value {
            LegendLocation::UpperLeft => SeriesLabelPosition::UpperLeft,
            LegendLocation::UpperMiddle => SeriesLabelPosition::UpperMiddle,
            LegendLocation::UpperRight => SeriesLabelPosition::UpperRight,
            LegendLocation::MiddleLeft => SeriesLabelPosition::MiddleLeft,
            LegendLocation::MiddleMiddle => SeriesLabelPosition::MiddleMiddle,
            LegendLocation::MiddleRight => SeriesLabelPosition::MiddleRight,
            LegendLocation::LowerLeft => SeriesLabelPosition::LowerLeft,
            LegendLocation::LowerMiddle => SeriesLabelPosition::LowerMiddle,
            LegendLocation::LowerRight => SeriesLabelPosition::LowerRight,
        }
    }
}

/// How the number above each bar is printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum ValueFormat {
    Fixed { precision: usize },
    Scientific { precision: usize },
}

impl Default for ValueFormat {
    fn default() -> Self {
        Self::Fixed { precision: 2 }
    }
}

impl ValueFormat {
    pub fn format(&self, value: f64) -> String {
        match *self {
            Self::Fixed { precision } => format!("{value:.precision$}"),
            Self::Scientific { precision } => format!("{value:.precision$e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChartOptions {
    /// Fraction of a category slot covered by its bar
    pub bar_width: f64,
    /// Width and height in inches
    pub figure_size: (f64, f64),
    /// Pixels per inch
    pub resolution: u32,
    /// Top of the tick range, the axis grows past it when a bar is taller
    pub y_max: f64,
    pub y_tick_step: f64,
    /// `#rrggbb`
    pub bar_color: String,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub legend_label: String,
    pub legend_location: LegendLocation,
    pub value_label_format: ValueFormat,
    /// Gap between the top of a bar and its value label, in y axis units
    pub value_label_offset: f64,
    pub font_family: String,
    /// TrueType file registered as `font_family`
    pub font_file: Option<PathBuf>,
    pub font_size: u32,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            bar_width: 0.5,
            figure_size: (8.0, 6.0),
            resolution: 80,
            y_max: 10.0,
            y_tick_step: 1.0,
            bar_color: "#87CEFA".to_owned(),
            title: "transfer time used to send file when chunk size changed".to_owned(),
            x_label: "chunk size".to_owned(),
            y_label: "transfer time (s)".to_owned(),
            legend_label: "transfer time".to_owned(),
            legend_location: LegendLocation::default(),
            value_label_format: ValueFormat::default(),
            value_label_offset: 0.05,
            font_family: "sans-serif".to_owned(),
            font_file: None,
            font_size: 10,
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigurationError {
    ConfigurationError::InvalidOption {
        field,
        reason: reason.into(),
    }
}

impl ChartOptions {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(self.bar_width > 0.0 && self.bar_width <= 1.0) {
            return Err(invalid(
                "bar_width",
                format!("{} is not within (0, 1]", self.bar_width),
            ));
        }
        let (width, height) = self.figure_size;
        if !(width > 0.0 && height > 0.0 && width.is_finite() && height.is_finite()) {
            return Err(invalid(
                "figure_size",
                format!("{width}x{height} is not a positive size"),
            ));
        }
        if self.resolution == 0 {
            return Err(invalid("resolution", "must be positive"));
        }
        let res = self.resolution as f64;
        if width * res > MAX_PIXELS as f64 || height * res > MAX_PIXELS as f64 {
            return Err(invalid(
                "figure_size",
                format!(
                    "{width}x{height} at {} per inch exceeds {MAX_PIXELS} pixels",
                    self.resolution
                ),
            ));
        }
        if !(self.y_max > 0.0 && self.y_max.is_finite()) {
            return Err(invalid("y_max", format!("{} is not positive", self.y_max)));
        }
        if !(self.y_tick_step > 0.0 && self.y_tick_step.is_finite()) {
            return Err(invalid(
                "y_tick_step",
                format!("{} is not positive", self.y_tick_step),
            ));
        }
        if self.y_max / self.y_tick_step > 1000.0 {
            return Err(invalid(
                "y_tick_step",
                format!("{} yields too many ticks", self.y_tick_step),
            ));
        }
        if !(self.value_label_offset >= 0.0 && self.value_label_offset.is_finite()) {
            return Err(invalid(
                "value_label_offset",
                format!("{} is not a non-negative offset", self.value_label_offset),
            ));
        }
        if self.font_size == 0 {
            return Err(invalid("font_size", "must be positive"));
        }
        parse_hex_color(&self.bar_color)
            .ok_or_else(|| invalid("bar_color", format!("{:?} is not #rrggbb", self.bar_color)))?;
        Ok(())
    }

    pub fn pixel_size(&self) -> (u32, u32) {
        let res = self.resolution as f64;
        (
            (self.figure_size.0 * res).round() as u32,
            (self.figure_size.1 * res).round() as u32,
        )
    }
}

/// Registers a TrueType font under `options.font_family`, once per process
fn register_font_family(options: &ChartOptions) -> Result<(), RenderError> {
    let mut registered = REGISTERED_FONTS
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if registered.contains(&options.font_family) {
        return Ok(());
    }

    let candidates = match &options.font_file {
        Some(path) => vec![path.clone()],
        None => SYSTEM_FONTS.iter().map(PathBuf::from).collect(),
    };
    let Some((path, bytes)) = candidates
        .iter()
        .find_map(|path| read(path).ok().map(|bytes| (path, bytes)))
    else {
        return Err(RenderError::Font(format!(
            "No font file found for {:?}, set chart.font_file",
            options.font_family
        )));
    };

    let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
    register_font(&options.font_family, FontStyle::Normal, bytes)
        .map_err(|_| RenderError::Font(format!("{path:?} is not a valid TrueType font")))?;
    debug!("Registered {path:?} as {:?}", options.font_family);
    registered.insert(options.font_family.clone());
    Ok(())
}

pub fn parse_hex_color(color: &str) -> Option<(u8, u8, u8)> {
    let hex = color.strip_prefix('#')?;
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub slot: usize,
    pub label: String,
    pub value: f64,
    pub value_label: String,
}

/// Linear axis whose labels and grid lines sit exactly on `ticks`
#[derive(Debug, Clone, PartialEq)]
pub struct TickAxis {
    range: Range<f64>,
    ticks: Vec<f64>,
}

impl TickAxis {
    pub fn new(range: Range<f64>, ticks: Vec<f64>) -> Self {
        Self { range, ticks }
    }
}

impl Ranged for TickAxis {
    type FormatOption = DefaultFormatting;
    type ValueType = f64;

    fn map(&self, value: &f64, limit: (i32, i32)) -> i32 {
        let span = self.range.end - self.range.start;
        if span == 0.0 {
            return (limit.0 + limit.1) / 2;
        }
        let ratio = (value - self.range.start) / span;
        limit.0 + (ratio * (limit.1 - limit.0) as f64).round() as i32
    }

    fn key_points<Hint: KeyPointHint>(&self, hint: Hint) -> Vec<f64> {
        // no light grid lines between ticks
        if hint.weight().allow_light_points() {
            return Vec::new();
        }
        self.ticks.clone()
    }

    fn range(&self) -> Range<f64> {
        self.range.clone()
    }
}

/// A validated bar chart, ready to be drawn onto any plotters backend
#[derive(Debug, Clone, PartialEq)]
pub struct BarChart {
    bars: Vec<Bar>,
    options: ChartOptions,
    color: (u8, u8, u8),
}

/// Builds one bar per value at slots `0..n`, labelled in order by `size_labels`.
/// Nothing is drawn until [`BarChart::draw`] or [`BarChart::save`].
pub fn render_bar_chart<S: AsRef<str>>(
    means: &[f64],
    size_labels: &[S],
    options: &ChartOptions,
) -> Result<BarChart, ConfigurationError> {
    if means.len() != size_labels.len() {
        return Err(ConfigurationError::LengthMismatch {
            means: means.len(),
            labels: size_labels.len(),
        });
    }
    options.validate()?;
    let color = parse_hex_color(&options.bar_color)
        .ok_or_else(|| invalid("bar_color", options.bar_color.clone()))?;

    let bars = means
        .iter()
        .zip_eq(size_labels)
        .enumerate()
        .map(|(slot, (&value, label))| {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigurationError::InvalidValue { index: slot, value });
            }
            Ok(Bar {
                slot,
                label: label.as_ref().to_owned(),
                value,
                value_label: options.value_label_format.format(value),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(BarChart {
        bars,
        options: options.clone(),
        color,
    })
}

pub fn render_chunk_means(
    means: &[ChunkMean],
    options: &ChartOptions,
) -> Result<BarChart, ConfigurationError> {
    let (values, labels): (Vec<f64>, Vec<&str>) =
        means.iter().map(|x| (x.mean, x.label.as_str())).unzip();
    render_bar_chart(&values, &labels, options)
}

impl BarChart {
    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn options(&self) -> &ChartOptions {
        &self.options
    }

    pub fn x_range(&self) -> Range<f64> {
        -0.5..(self.bars.len().max(1) as f64 - 0.5)
    }

    pub fn y_range(&self) -> Range<f64> {
        let tallest = self
            .bars
            .iter()
            .map(|x| x.value + self.options.value_label_offset)
            .fold(0.0, f64::max);
        0.0..self.options.y_max.max(tallest) * 1.05
    }

    pub fn x_ticks(&self) -> Vec<f64> {
        self.bars.iter().map(|x| x.slot as f64).collect()
    }

    /// `0, step, 2 * step, ...` up to and including `y_max`
    pub fn y_ticks(&self) -> Vec<f64> {
        let step = self.options.y_tick_step;
        let count = (self.options.y_max / step + 1e-9).floor() as usize;
        (0..=count).map(|i| i as f64 * step).collect()
    }

    /// Lower left and upper right corners of a bar
    pub fn bar_extent(&self, bar: &Bar) -> [(f64, f64); 2] {
        let half = self.options.bar_width / 2.0;
        let x = bar.slot as f64;
        [(x - half, 0.0), (x + half, bar.value)]
    }

    /// Bottom center of a bar's value label
    pub fn value_label_anchor(&self, bar: &Bar) -> (f64, f64) {
        (bar.slot as f64, bar.value + self.options.value_label_offset)
    }

    /// Size label of the slot at `x`, empty between slots
    pub fn size_label_at(&self, x: f64) -> String {
        let slot = x.round();
        if (x - slot).abs() > 1e-6 || slot < 0.0 {
            return String::new();
        }
        self.bars
            .get(slot as usize)
            .map(|x| x.label.clone())
            .unwrap_or_default()
    }

    /// Registers the configured font if needed, then draws. A missing font is reported
    /// as a backend font error.
    pub fn draw<DB: DrawingBackend>(
        &self,
        root: &DrawingArea<DB, Shift>,
    ) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
        register_font_family(&self.options).map_err(|e| {
            DrawingAreaErrorKind::BackendError(DrawingErrorKind::FontError(Box::new(e)))
        })?;

        let opts = &self.options;
        let color = RGBColor(self.color.0, self.color.1, self.color.2);
        let font = opts.font_family.as_str();

        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(root)
            .caption(&opts.title, (font, opts.font_size + 6))
            .margin(10)
            .set_label_area_size(LabelAreaPosition::Left, 50)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .build_cartesian_2d(
                TickAxis::new(self.x_range(), self.x_ticks()),
                TickAxis::new(self.y_range(), self.y_ticks()),
            )?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(self.bars.len().max(1))
            .y_labels(self.y_ticks().len())
            .x_label_formatter(&|x| self.size_label_at(*x))
            .y_label_formatter(&|y| format!("{y}"))
            .x_desc(&opts.x_label)
            .y_desc(&opts.y_label)
            .axis_desc_style((font, opts.font_size + 2))
            .label_style((font, opts.font_size))
            .draw()?;

        chart
            .draw_series(
                self.bars
                    .iter()
                    .map(|bar| Rectangle::new(self.bar_extent(bar), color.filled())),
            )?
            .label(&opts.legend_label)
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));

        let value_style =
            TextStyle::from((font, opts.font_size).into_font()).pos(Pos::new(HPos::Center, VPos::Bottom));
        chart.draw_series(self.bars.iter().map(|bar| {
            Text::new(
                bar.value_label.clone(),
                self.value_label_anchor(bar),
                value_style.clone(),
            )
        }))?;

        chart
            .configure_series_labels()
            .position(opts.legend_location.into())
            .label_font((font, opts.font_size))
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()?;

        root.present()?;
        Ok(())
    }

    /// Writes a `.png` or `.svg` image sized `figure_size * resolution`
    pub fn save(&self, path: &Path) -> Result<(), RenderError> {
        let size = self.options.pixel_size();
        let backend_err = |source: Box<dyn std::error::Error + Send + Sync>| RenderError::Backend {
            path: path.to_path_buf(),
            source,
        };
        let extension = path.extension().and_then(|x| x.to_str());
        if !matches!(extension, Some("png" | "svg")) {
            return Err(ConfigurationError::UnsupportedOutput(path.to_path_buf()).into());
        }
        // before the backend exists, a bitmap backend writes its file when dropped
        register_font_family(&self.options)?;

        debug!("Drawing {} bars to {path:?} at {size:?}", self.bars.len());
        match extension {
            Some("png") => {
                let root = BitMapBackend::new(path, size).into_drawing_area();
                self.draw(&root).map_err(|e| backend_err(Box::new(e)))
            }
            _ => {
                let root = SVGBackend::new(path, size).into_drawing_area();
                self.draw(&root).map_err(|e| backend_err(Box::new(e)))
            }
        }
    }
}

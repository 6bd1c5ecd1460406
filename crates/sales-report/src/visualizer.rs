//! Chart rendering.
//!
//! Each chart is declared by a [`ChartSpec`] and computed through the shared
//! [`Analyzer`], so a number shown in a chart is the number the context
//! document reports. Charts are written as standalone plotly HTML files under
//! `<output>/plots/<id>.html`. A chart that cannot be produced becomes a
//! [`ChartError`] for that id; the others are unaffected.

use crate::analysis::{Analyzer, BinSpec, Dimension, Group, Measure};
use crate::dataset::Dataset;
use crate::transform::sections::{fmt_count, fmt_money};
use plotly::common::{DashType, Line, Marker, Mode, Title};
use plotly::layout::{Axis, BarMode, BoxMode};
use plotly::{Bar, BoxPlot, Layout, Plot, Scatter};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Subdirectory of the output directory receiving chart files.
pub const PLOTS_DIR: &str = "plots";

/// Visual form of a chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Line,
    Bar,
    Scatter,
    Box,
}

/// Declarative description of one chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    /// Output identifier, also the file stem.
    pub id: String,
    pub kind: ChartKind,
    /// One or two grouping dimensions: the x axis, then the series split.
    pub group_by: Vec<String>,
    /// Measured column (e.g. "sales_volume", "price_usd").
    pub value: String,
    pub title: String,
    /// Keep only the top N x-axis keys by units sold.
    #[serde(default)]
    pub top: Option<usize>,
    /// Add a dashed line of the x-axis totals (line charts only).
    #[serde(default)]
    pub overlay_total: bool,
}

impl ChartSpec {
    pub fn new(id: &str, kind: ChartKind, group_by: &[&str], value: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            kind,
            group_by: group_by.iter().map(|g| g.to_string()).collect(),
            value: value.to_string(),
            title: title.to_string(),
            top: None,
            overlay_total: false,
        }
    }

    pub fn with_top(mut self, n: usize) -> Self {
        self.top = Some(n);
        self
    }

    pub fn with_total_overlay(mut self) -> Self {
        self.overlay_total = true;
        self
    }

    /// The default chart set.
    pub fn defaults() -> Vec<ChartSpec> {
        vec![
            ChartSpec::new(
                "regional-trend",
                ChartKind::Line,
                &["year", "region"],
                "sales_volume",
                "Sales Trends: Regional Performance Overlaid with Global Trend (Units)",
            )
            .with_total_overlay(),
            ChartSpec::new(
                "top-models",
                ChartKind::Bar,
                &["model", "fuel_type"],
                "sales_volume",
                "Top 10 Models: Sales Volume Composition by Fuel Type",
            )
            .with_top(10),
            ChartSpec::new(
                "price-elasticity",
                ChartKind::Scatter,
                &["transmission", "fuel_type"],
                "price_usd",
                "Price vs. Sales Volume by Transmission and Fuel Type",
            ),
            ChartSpec::new(
                "engine-price-box",
                ChartKind::Box,
                &["engine_bin", "fuel_type"],
                "price_usd",
                "Price Distribution by Engine Size and Fuel Type",
            ),
            ChartSpec::new(
                "fuel-momentum",
                ChartKind::Line,
                &["year", "fuel_type"],
                "sales_volume",
                "Fuel Type Momentum: Yearly Sales Volume by Fuel Type",
            ),
        ]
    }

    /// Relative path of the chart file as referenced from the report.
    pub fn relative_path(&self) -> String {
        format!("{}/{}.html", PLOTS_DIR, self.id)
    }
}

/// One rendered chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartArtifact {
    pub id: String,
    pub kind: ChartKind,
    pub title: String,
    /// One-line textual summary with the key number.
    pub caption: String,
    /// Path relative to the report files (`plots/<id>.html`).
    pub relative_path: String,
    /// Where the file was written.
    pub path: PathBuf,
}

/// Why a chart could not be rendered.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChartErrorKind {
    #[error("unknown dimension '{0}'")]
    UnknownDimension(String),

    #[error("dimension '{0}' is not present in the dataset")]
    AbsentDimension(String),

    #[error("unknown value column '{0}'")]
    UnknownMeasure(String),

    #[error("invalid chart spec: {0}")]
    InvalidSpec(String),

    #[error("no data to plot")]
    EmptyData,

    #[error("failed to write chart: {0}")]
    Io(String),
}

/// A failed chart, keyed by its id.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("chart '{id}': {kind}")]
pub struct ChartError {
    pub id: String,
    pub kind: ChartErrorKind,
}

/// Outcome of rendering a chart set.
#[derive(Debug, Clone, Default)]
pub struct ChartRender {
    pub artifacts: Vec<ChartArtifact>,
    pub errors: Vec<ChartError>,
}

impl ChartRender {
    pub fn artifact(&self, id: &str) -> Option<&ChartArtifact> {
        self.artifacts.iter().find(|a| a.id == id)
    }
}

/// Bin definitions used to resolve binned dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualizerOptions {
    pub engine_bins: BinSpec,
    pub mileage_bins: BinSpec,
}

impl Default for VisualizerOptions {
    fn default() -> Self {
        Self {
            engine_bins: BinSpec::engine_size(),
            mileage_bins: BinSpec::mileage(),
        }
    }
}

struct Figure {
    plot: Plot,
    caption: String,
}

/// Renders [`ChartSpec`]s from a [`Dataset`].
pub struct Visualizer {
    output_dir: PathBuf,
    options: VisualizerOptions,
}

impl Visualizer {
    /// `output_dir` is the report directory; charts go to its `plots/` child.
    pub fn new(output_dir: impl Into<PathBuf>, options: VisualizerOptions) -> Self {
        Self {
            output_dir: output_dir.into(),
            options,
        }
    }

    pub fn plots_dir(&self) -> PathBuf {
        self.output_dir.join(PLOTS_DIR)
    }

    /// Render every spec, collecting artifacts and per-chart errors.
    pub fn render(&self, dataset: &Dataset, specs: &[ChartSpec]) -> ChartRender {
        let analyzer = Analyzer::new(dataset, &self.options.engine_bins, &self.options.mileage_bins);
        let mut render = ChartRender::default();

        for spec in specs {
            match self.render_one(&analyzer, spec) {
                Ok(artifact) => {
                    debug!(chart = %artifact.id, path = %artifact.path.display(), "Rendered chart");
                    render.artifacts.push(artifact);
                }
                Err(kind) => {
                    let error = ChartError {
                        id: spec.id.clone(),
                        kind,
                    };
                    warn!(chart = %spec.id, "Skipping chart: {}", error.kind);
                    render.errors.push(error);
                }
            }
        }

        info!(
            rendered = render.artifacts.len(),
            failed = render.errors.len(),
            "Chart rendering complete"
        );
        render
    }

    fn render_one(&self, analyzer: &Analyzer<'_>, spec: &ChartSpec) -> Result<ChartArtifact, ChartErrorKind> {
        let dims = resolve_dimensions(analyzer, spec)?;
        let measure = Measure::from_name(&spec.value)
            .ok_or_else(|| ChartErrorKind::UnknownMeasure(spec.value.clone()))?;

        let figure = match spec.kind {
            ChartKind::Line => line_chart(analyzer, spec, &dims, measure)?,
            ChartKind::Bar => bar_chart(analyzer, spec, &dims, measure)?,
            ChartKind::Scatter => scatter_chart(analyzer, spec, &dims, measure)?,
            ChartKind::Box => box_chart(analyzer, spec, &dims, measure)?,
        };

        let path = self.write(&spec.id, &figure.plot)?;
        Ok(ChartArtifact {
            id: spec.id.clone(),
            kind: spec.kind,
            title: spec.title.clone(),
            caption: figure.caption,
            relative_path: spec.relative_path(),
            path,
        })
    }

    fn write(&self, id: &str, plot: &Plot) -> Result<PathBuf, ChartErrorKind> {
        let dir = self.plots_dir();
        fs::create_dir_all(&dir).map_err(|e| ChartErrorKind::Io(format!("{}: {}", dir.display(), e)))?;
        let path = dir.join(format!("{}.html", id));
        fs::write(&path, plot.to_html())
            .map_err(|e| ChartErrorKind::Io(format!("{}: {}", path.display(), e)))?;
        Ok(path)
    }
}

fn resolve_dimensions(analyzer: &Analyzer<'_>, spec: &ChartSpec) -> Result<Vec<Dimension>, ChartErrorKind> {
    if spec.group_by.is_empty() || spec.group_by.len() > 2 {
        return Err(ChartErrorKind::InvalidSpec(format!(
            "expected one or two grouping dimensions, got {}",
            spec.group_by.len()
        )));
    }
    spec.group_by
        .iter()
        .map(|name| {
            let dimension =
                Dimension::from_name(name).ok_or_else(|| ChartErrorKind::UnknownDimension(name.clone()))?;
            if analyzer.supports(dimension) {
                Ok(dimension)
            } else {
                Err(ChartErrorKind::AbsentDimension(name.clone()))
            }
        })
        .collect()
}

/// Sum for additive measures, mean otherwise.
fn aggregate(measure: Measure, group: &Group) -> f64 {
    match measure {
        Measure::Units | Measure::Revenue => group.sum(),
        _ => group.mean(),
    }
}

fn format_value(measure: Measure, value: f64) -> String {
    match measure {
        Measure::Units => fmt_count(value.round() as u64),
        Measure::Revenue | Measure::Price => fmt_money(value),
        Measure::EngineSize => format!("{:.2}L", value),
        Measure::Mileage => format!("{}km", fmt_count(value.round() as u64)),
    }
}

/// Distinct keys at `position`, in the natural order of `dimension`.
fn ordered_keys(analyzer: &Analyzer<'_>, groups: &[Group], position: usize, dimension: Dimension) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut keys: Vec<String> = groups
        .iter()
        .filter_map(|g| g.keys.get(position))
        .filter(|k| seen.insert(k.to_string()))
        .cloned()
        .collect();
    keys.sort_by(|a, b| analyzer.compare_keys(dimension, a, b));
    keys
}

fn layout(spec: &ChartSpec, x: Dimension, y_label: &str) -> Layout {
    Layout::new()
        .title(Title::with_text(spec.title.as_str()))
        .x_axis(Axis::new().title(Title::with_text(x.label())))
        .y_axis(Axis::new().title(Title::with_text(y_label)))
}

fn line_chart(
    analyzer: &Analyzer<'_>,
    spec: &ChartSpec,
    dims: &[Dimension],
    measure: Measure,
) -> Result<Figure, ChartErrorKind> {
    let x_dim = dims[0];
    let groups = analyzer.group(dims, measure);
    if groups.is_empty() {
        return Err(ChartErrorKind::EmptyData);
    }
    let x_keys = ordered_keys(analyzer, &groups, 0, x_dim);

    let mut plot = Plot::new();
    let mut leader: Option<(String, f64)> = None;
    if let Some(&series_dim) = dims.get(1) {
        let last_x = x_keys.last().cloned().unwrap_or_default();
        for series in ordered_keys(analyzer, &groups, 1, series_dim) {
            let mut xs = Vec::new();
            let mut ys = Vec::new();
            for x in &x_keys {
                if let Some(g) = groups.iter().find(|g| &g.keys[0] == x && g.keys[1] == series) {
                    let value = aggregate(measure, g);
                    if *x == last_x && leader.as_ref().is_none_or(|(_, v)| value > *v) {
                        leader = Some((series.clone(), value));
                    }
                    xs.push(x.clone());
                    ys.push(value);
                }
            }
            plot.add_trace(Scatter::new(xs, ys).name(series.as_str()).mode(Mode::LinesMarkers));
        }
    }

    let totals = x_totals(analyzer, x_dim, measure);
    if spec.overlay_total || dims.len() == 1 {
        let (xs, ys): (Vec<String>, Vec<f64>) = totals.iter().cloned().unzip();
        plot.add_trace(
            Scatter::new(xs, ys)
                .name("Global")
                .mode(Mode::LinesMarkers)
                .line(Line::new().width(3.0).dash(DashType::Dash).color("#000000")),
        );
    }
    plot.set_layout(layout(spec, x_dim, measure.label()));

    let mut caption = match (totals.first(), totals.last()) {
        (Some((first_x, first_v)), Some((last_x, last_v))) if totals.len() > 1 => format!(
            "Total {} went from {} in {} to {} in {}",
            measure.label().to_lowercase(),
            format_value(measure, *first_v),
            first_x,
            format_value(measure, *last_v),
            last_x
        ),
        (Some((x, v)), _) => format!("Total {} was {} in {}", measure.label().to_lowercase(), format_value(measure, *v), x),
        _ => return Err(ChartErrorKind::EmptyData),
    };
    if let (Some((key, value)), Some(last_x)) = (leader, x_keys.last()) {
        caption.push_str(&format!("; {} led in {} with {}", key, last_x, format_value(measure, value)));
    }
    caption.push('.');
    Ok(Figure { plot, caption })
}

/// Totals along the x axis. Yearly units come from the same function the
/// context document uses.
fn x_totals(analyzer: &Analyzer<'_>, x_dim: Dimension, measure: Measure) -> Vec<(String, f64)> {
    if x_dim == Dimension::Year && measure == Measure::Units {
        return analyzer
            .yearly_totals()
            .into_iter()
            .map(|(y, u)| (y.to_string(), u as f64))
            .collect();
    }
    let mut groups = analyzer.group(&[x_dim], measure);
    groups.sort_by(|a, b| analyzer.compare_keys(x_dim, &a.keys[0], &b.keys[0]));
    groups
        .iter()
        .map(|g| (g.keys[0].clone(), aggregate(measure, g)))
        .collect()
}

fn bar_chart(
    analyzer: &Analyzer<'_>,
    spec: &ChartSpec,
    dims: &[Dimension],
    measure: Measure,
) -> Result<Figure, ChartErrorKind> {
    let x_dim = dims[0];
    let x_keys: Vec<String> = match spec.top {
        Some(n) => analyzer.top_n(x_dim, n).into_iter().map(|(k, _)| k).collect(),
        None => ordered_keys(analyzer, &analyzer.group(&[x_dim], measure), 0, x_dim),
    };
    if x_keys.is_empty() {
        return Err(ChartErrorKind::EmptyData);
    }

    let groups = analyzer.group(dims, measure);
    let mut plot = Plot::new();
    match dims.get(1) {
        Some(&series_dim) => {
            for series in ordered_keys(analyzer, &groups, 1, series_dim) {
                let (xs, ys): (Vec<String>, Vec<f64>) = x_keys
                    .iter()
                    .filter_map(|x| {
                        groups
                            .iter()
                            .find(|g| &g.keys[0] == x && g.keys[1] == series)
                            .map(|g| (x.clone(), aggregate(measure, g)))
                    })
                    .unzip();
                if !xs.is_empty() {
                    plot.add_trace(Bar::new(xs, ys).name(series.as_str()));
                }
            }
        }
        None => {
            let (xs, ys): (Vec<String>, Vec<f64>) = x_keys
                .iter()
                .filter_map(|x| {
                    groups
                        .iter()
                        .find(|g| &g.keys[0] == x)
                        .map(|g| (x.clone(), aggregate(measure, g)))
                })
                .unzip();
            plot.add_trace(Bar::new(xs, ys).name(measure.label()));
        }
    }
    plot.set_layout(layout(spec, x_dim, measure.label()).bar_mode(BarMode::Stack));

    let leader = x_keys
        .iter()
        .map(|x| {
            let total: f64 = groups.iter().filter(|g| &g.keys[0] == x).map(|g| aggregate(measure, g)).sum();
            (x, total)
        })
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
        .ok_or(ChartErrorKind::EmptyData)?;
    let caption = format!(
        "{} leads with {} {} across {} {} shown.",
        leader.0,
        format_value(measure, leader.1),
        measure.label().to_lowercase(),
        x_keys.len(),
        x_dim.label().to_lowercase()
    );
    Ok(Figure { plot, caption })
}

fn scatter_chart(
    analyzer: &Analyzer<'_>,
    spec: &ChartSpec,
    dims: &[Dimension],
    measure: Measure,
) -> Result<Figure, ChartErrorKind> {
    let groups = analyzer.group(dims, measure);
    if groups.is_empty() {
        return Err(ChartErrorKind::EmptyData);
    }
    let max_units = groups.iter().map(|g| g.units).max().unwrap_or(1).max(1);

    let mut plot = Plot::new();
    for trace_key in ordered_keys(analyzer, &groups, 0, dims[0]) {
        let members: Vec<&Group> = groups.iter().filter(|g| g.keys[0] == trace_key).collect();
        let xs: Vec<f64> = members.iter().map(|g| g.mean()).collect();
        let ys: Vec<u64> = members.iter().map(|g| g.units).collect();
        let labels: Vec<String> = members.iter().map(|g| g.keys.join(" / ")).collect();
        let sizes: Vec<usize> = members
            .iter()
            .map(|g| 10 + (g.units as f64 / max_units as f64 * 35.0) as usize)
            .collect();
        plot.add_trace(
            Scatter::new(xs, ys)
                .name(trace_key.as_str())
                .mode(Mode::Markers)
                .text_array(labels)
                .marker(Marker::new().size_array(sizes)),
        );
    }
    plot.set_layout(
        Layout::new()
            .title(Title::with_text(spec.title.as_str()))
            .x_axis(Axis::new().title(Title::with_text(format!("Average {}", measure.label()))))
            .y_axis(Axis::new().title(Title::with_text(Measure::Units.label()))),
    );

    let top = groups
        .iter()
        .max_by(|a, b| a.units.cmp(&b.units).then_with(|| b.keys.cmp(&a.keys)))
        .ok_or(ChartErrorKind::EmptyData)?;
    let caption = format!(
        "Highest-volume segment: {} with {} units at an average {} of {}.",
        top.keys.join(" / "),
        fmt_count(top.units),
        measure.label().to_lowercase(),
        format_value(measure, top.mean())
    );
    Ok(Figure { plot, caption })
}

fn box_chart(
    analyzer: &Analyzer<'_>,
    spec: &ChartSpec,
    dims: &[Dimension],
    measure: Measure,
) -> Result<Figure, ChartErrorKind> {
    let x_dim = dims[0];
    let groups = analyzer.group(dims, measure);
    if groups.is_empty() {
        return Err(ChartErrorKind::EmptyData);
    }

    let mut plot = Plot::new();
    let trace_keys = match dims.get(1) {
        Some(&series_dim) => ordered_keys(analyzer, &groups, 1, series_dim),
        None => vec![String::new()],
    };
    for trace_key in &trace_keys {
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for group in groups.iter().filter(|g| g.keys.get(1).is_none_or(|k| k == trace_key)) {
            for value in &group.values {
                xs.push(group.keys[0].clone());
                ys.push(*value);
            }
        }
        let trace = BoxPlot::new_xy(xs, ys);
        let trace = if trace_key.is_empty() { trace } else { trace.name(trace_key.as_str()) };
        plot.add_trace(trace);
    }
    plot.set_layout(layout(spec, x_dim, measure.label()).box_mode(BoxMode::Group));

    let top = groups
        .iter()
        .filter_map(|g| g.stats().map(|s| (g, s.median)))
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
        .ok_or(ChartErrorKind::EmptyData)?;
    let caption = format!(
        "Highest median {}: {} at {}.",
        measure.label().to_lowercase(),
        top.0.keys.join(" / "),
        format_value(measure, top.1)
    );
    Ok(Figure { plot, caption })
}

/// Whether `path` looks like a chart written by this module.
pub fn is_chart_file(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "html")
        && path
            .parent()
            .and_then(|p| p.file_name())
            .is_some_and(|n| n == PLOTS_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_dataset;

    fn visualizer(dir: &Path) -> Visualizer {
        Visualizer::new(dir, VisualizerOptions::default())
    }

    #[test]
    fn test_default_charts_all_render() {
        let dir = tempfile::tempdir().unwrap();
        let render = visualizer(dir.path()).render(&sample_dataset(), &ChartSpec::defaults());

        assert!(render.errors.is_empty(), "unexpected errors: {:?}", render.errors);
        assert_eq!(render.artifacts.len(), 5);
        for artifact in &render.artifacts {
            assert!(artifact.path.exists());
            assert!(is_chart_file(&artifact.path));
            assert_eq!(artifact.relative_path, format!("plots/{}.html", artifact.id));
            assert!(!artifact.caption.is_empty());
        }
    }

    #[test]
    fn test_unknown_dimension_fails_only_that_chart() {
        let dir = tempfile::tempdir().unwrap();
        let mut specs = ChartSpec::defaults();
        specs.push(ChartSpec::new("by-dealer", ChartKind::Bar, &["dealer"], "sales_volume", "Dealers"));
        let render = visualizer(dir.path()).render(&sample_dataset(), &specs);

        assert_eq!(render.errors.len(), 1);
        assert_eq!(render.errors[0].id, "by-dealer");
        assert_eq!(render.errors[0].kind, ChartErrorKind::UnknownDimension("dealer".to_string()));
        assert_eq!(render.artifacts.len(), 5);
    }

    #[test]
    fn test_absent_optional_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let specs = vec![ChartSpec::new("colors", ChartKind::Bar, &["color"], "sales_volume", "Colors")];
        let render = visualizer(dir.path()).render(&sample_dataset(), &specs);
        assert_eq!(render.errors[0].kind, ChartErrorKind::AbsentDimension("color".to_string()));
    }

    #[test]
    fn test_unknown_measure_and_bad_arity() {
        let dir = tempfile::tempdir().unwrap();
        let specs = vec![
            ChartSpec::new("a", ChartKind::Line, &["year"], "profit", "A"),
            ChartSpec::new("b", ChartKind::Line, &["year", "region", "model"], "sales_volume", "B"),
        ];
        let render = visualizer(dir.path()).render(&sample_dataset(), &specs);
        assert!(matches!(render.errors[0].kind, ChartErrorKind::UnknownMeasure(_)));
        assert!(matches!(render.errors[1].kind, ChartErrorKind::InvalidSpec(_)));
    }

    #[test]
    fn test_trend_caption_uses_yearly_totals() {
        let dataset = sample_dataset();
        let dir = tempfile::tempdir().unwrap();
        let render = visualizer(dir.path()).render(&dataset, &ChartSpec::defaults()[..1]);
        let engine = BinSpec::engine_size();
        let mileage = BinSpec::mileage();
        let totals = Analyzer::new(&dataset, &engine, &mileage).yearly_totals();
        let (first_year, first_units) = totals[0];
        let caption = &render.artifact("regional-trend").unwrap().caption;
        assert!(caption.contains(&format!("{} in {}", fmt_count(first_units), first_year)));
    }

    #[test]
    fn test_spec_deserializes_with_defaults() {
        let json = r#"{"id": "x", "kind": "box", "group_by": ["engine_size"], "value": "price_usd", "title": "X"}"#;
        let spec: ChartSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.kind, ChartKind::Box);
        assert_eq!(spec.top, None);
        assert!(!spec.overlay_total);
    }
}

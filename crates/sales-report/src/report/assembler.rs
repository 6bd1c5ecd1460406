//! Report layout, run metadata and Markdown rendering.

use super::html;
use crate::dataset::Dataset;
use crate::narrative::{Narrative, ReportSection};
use crate::visualizer::ChartArtifact;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Title shared by both renderings.
pub const REPORT_TITLE: &str = "Automated Business Intelligence Report";

/// Text shown in place of a section the narrative lacks.
pub const UNAVAILABLE: &str = "Data unavailable for this section.";

/// Charts placed under one report section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkeletonEntry {
    pub section: ReportSection,
    pub charts: Vec<String>,
}

/// Fixed section order plus the chart ids each section shows.
///
/// Charts that are rendered but not placed anywhere end up under
/// [`ReportSection::ChartCommentary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSkeleton {
    entries: Vec<SkeletonEntry>,
}

impl Default for ReportSkeleton {
    fn default() -> Self {
        let charts = |ids: &[&str]| ids.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            entries: vec![
                SkeletonEntry {
                    section: ReportSection::ExecutiveSummary,
                    charts: Vec::new(),
                },
                SkeletonEntry {
                    section: ReportSection::Trends,
                    charts: charts(&["regional-trend", "fuel-momentum"]),
                },
                SkeletonEntry {
                    section: ReportSection::Performance,
                    charts: charts(&["top-models"]),
                },
                SkeletonEntry {
                    section: ReportSection::KeyDrivers,
                    charts: charts(&["price-elasticity", "engine-price-box"]),
                },
                SkeletonEntry {
                    section: ReportSection::CreativeInsights,
                    charts: Vec::new(),
                },
                SkeletonEntry {
                    section: ReportSection::ChartCommentary,
                    charts: Vec::new(),
                },
            ],
        }
    }
}

impl ReportSkeleton {
    /// Move `chart_id` under `section`, removing it from wherever it was.
    pub fn place(mut self, section: ReportSection, chart_id: &str) -> Self {
        for entry in &mut self.entries {
            entry.charts.retain(|id| id != chart_id);
        }
        if let Some(entry) = self.entries.iter_mut().find(|e| e.section == section) {
            entry.charts.push(chart_id.to_string());
        }
        self
    }

    pub fn charts_for(&self, section: ReportSection) -> &[String] {
        self.entries
            .iter()
            .find(|e| e.section == section)
            .map(|e| e.charts.as_slice())
            .unwrap_or(&[])
    }

    fn placed(&self, chart_id: &str) -> bool {
        self.entries.iter().any(|e| e.charts.iter().any(|id| id == chart_id))
    }
}

/// Outcome of validation as shown in the banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValidationStatus {
    Passed,
    /// Some rows were dropped or imputed, within tolerance.
    PassedWithWarnings,
}

impl ValidationStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Passed => "Passed",
            Self::PassedWithWarnings => "Passed with warnings",
        }
    }
}

/// Banner information printed at the top of the report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub generated_at: DateTime<Local>,
    pub model: String,
    pub data_source: String,
    pub record_count: usize,
    pub validation_status: ValidationStatus,
    pub warnings: Vec<String>,
}

impl ReportMetadata {
    /// Metadata for a report about `dataset`, stamped with the current time.
    pub fn for_dataset(dataset: &Dataset, model: impl Into<String>, warnings: Vec<String>) -> Self {
        let meta = dataset.meta();
        let clean = meta.violation_count == 0 && meta.imputation.is_empty();
        Self {
            generated_at: Local::now(),
            model: model.into(),
            data_source: meta.source.clone(),
            record_count: dataset.len(),
            validation_status: if clean {
                ValidationStatus::Passed
            } else {
                ValidationStatus::PassedWithWarnings
            },
            warnings,
        }
    }

    pub fn generation_time(&self) -> String {
        self.generated_at.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    /// Label/value pairs in banner order.
    pub fn banner(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Report Generated", self.generation_time()),
            ("AI Model", self.model.clone()),
            ("Data Source", self.data_source.clone()),
            ("Records Analyzed", self.record_count.to_string()),
            ("Validation Status", self.validation_status.label().to_string()),
        ]
    }
}

/// One section of the assembled report.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledSection {
    pub section: ReportSection,
    /// Markdown body, or `None` when the narrative has no such section.
    pub body: Option<String>,
    pub charts: Vec<ChartArtifact>,
}

/// The rendered report.
#[derive(Debug, Clone)]
pub struct Report {
    pub sections: Vec<AssembledSection>,
    markdown: String,
    html: String,
}

impl Report {
    pub fn markdown(&self) -> &str {
        &self.markdown
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    /// Write `<base>.md` and `<base>.html` into `dir`.
    ///
    /// Both files are always attempted; each carries its own result.
    pub fn write(&self, dir: &Path, base_name: &str) -> WriteOutcome {
        let markdown = write_file(&dir.join(format!("{}.md", base_name)), &self.markdown);
        let html = write_file(&dir.join(format!("{}.html", base_name)), &self.html);
        let outcome = WriteOutcome { markdown, html };
        for error in outcome.errors() {
            warn!("{}", error);
        }
        outcome
    }
}

fn write_file(path: &Path, contents: &str) -> io::Result<PathBuf> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)?;
    info!(path = %path.display(), bytes = contents.len(), "Report file written");
    Ok(path.to_path_buf())
}

/// Per-file result of [`Report::write`].
#[derive(Debug)]
pub struct WriteOutcome {
    pub markdown: io::Result<PathBuf>,
    pub html: io::Result<PathBuf>,
}

impl WriteOutcome {
    pub fn all_written(&self) -> bool {
        self.markdown.is_ok() && self.html.is_ok()
    }

    /// Paths that were written.
    pub fn written(&self) -> Vec<&Path> {
        [&self.markdown, &self.html]
            .into_iter()
            .filter_map(|r| r.as_ref().ok().map(PathBuf::as_path))
            .collect()
    }

    /// One message per failed file.
    pub fn errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if let Err(e) = &self.markdown {
            errors.push(format!("failed to write Markdown report: {}", e));
        }
        if let Err(e) = &self.html {
            errors.push(format!("failed to write HTML report: {}", e));
        }
        errors
    }
}

/// Combines narrative, charts and metadata into a [`Report`].
#[derive(Debug, Clone, Default)]
pub struct ReportAssembler {
    skeleton: ReportSkeleton,
}

impl ReportAssembler {
    pub fn new(skeleton: ReportSkeleton) -> Self {
        Self { skeleton }
    }

    pub fn assemble(
        &self,
        narrative: &Narrative,
        charts: &[ChartArtifact],
        metadata: &ReportMetadata,
    ) -> Report {
        let lookup = |id: &str| charts.iter().find(|c| c.id == id).cloned();

        let sections: Vec<AssembledSection> = ReportSection::ALL
            .into_iter()
            .map(|section| {
                let mut placed: Vec<ChartArtifact> = self
                    .skeleton
                    .charts_for(section)
                    .iter()
                    .filter_map(|id| lookup(id))
                    .collect();
                if section == ReportSection::ChartCommentary {
                    placed.extend(
                        charts
                            .iter()
                            .filter(|c| !self.skeleton.placed(&c.id))
                            .cloned(),
                    );
                }
                AssembledSection {
                    section,
                    body: narrative.section(section).map(str::to_string),
                    charts: placed,
                }
            })
            .collect();

        let markdown = render_markdown(narrative, &sections, metadata);
        let html = html::render(narrative, &sections, metadata);
        info!(
            sections = sections.iter().filter(|s| s.body.is_some()).count(),
            charts = sections.iter().map(|s| s.charts.len()).sum::<usize>(),
            degraded = narrative.is_degraded(),
            "Report assembled"
        );

        Report {
            sections,
            markdown,
            html,
        }
    }
}

fn render_markdown(narrative: &Narrative, sections: &[AssembledSection], metadata: &ReportMetadata) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", REPORT_TITLE);

    for (label, value) in metadata.banner() {
        let _ = writeln!(out, "- **{}:** {}", label, value);
    }
    out.push('\n');

    if !metadata.warnings.is_empty() {
        out.push_str("> **Warnings**\n");
        for warning in &metadata.warnings {
            let _ = writeln!(out, "> - {}", warning);
        }
        out.push('\n');
    }

    if let Some(reason) = narrative.degraded_reason() {
        let _ = writeln!(out, "> **Narrative unavailable:** {}\n", reason);
    }

    if !narrative.preamble().is_empty() {
        let _ = writeln!(out, "{}\n", narrative.preamble());
    }

    for section in sections {
        let _ = writeln!(out, "## {}\n", section.section.title());
        match &section.body {
            Some(body) => {
                let _ = writeln!(out, "{}\n", body);
            }
            None => {
                let _ = writeln!(out, "_{}_\n", UNAVAILABLE);
            }
        }
        for chart in &section.charts {
            let _ = writeln!(
                out,
                "**Figure: {}** - {} ([open chart]({}))\n",
                chart.title, chart.caption, chart.relative_path
            );
        }
    }

    out.truncate(out.trim_end().len());
    out.push('\n');
    out
}

//! Parsing of the model's Markdown answer into report sections.
//!
//! Headings are matched to [`ReportSection`]s by keyword, ignoring case,
//! leading emoji and numbering ("## 2. 📈 Sales Trends" is `Trends`). The
//! first matched heading fixes the section level; deeper headings stay inside
//! the section body. Text before the first matched heading is the preamble.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ {0,3}(#{1,6})\s+(.*?)\s*#*\s*$").expect("Invalid regex: heading"));

/// Leading numbering such as "1.", "2)", "IV." or "Section 3:".
static NUMBERING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)(section\s+)?([0-9]+|[ivx]+)[.):]\s*").expect("Invalid regex: numbering")
});

/// Fixed sections of the report, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSection {
    ExecutiveSummary,
    Trends,
    Performance,
    KeyDrivers,
    CreativeInsights,
    ChartCommentary,
}

impl ReportSection {
    pub const ALL: [ReportSection; 6] = [
        Self::ExecutiveSummary,
        Self::Trends,
        Self::Performance,
        Self::KeyDrivers,
        Self::CreativeInsights,
        Self::ChartCommentary,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Self::ExecutiveSummary => "Executive Summary",
            Self::Trends => "Trends",
            Self::Performance => "Model and Market Performance",
            Self::KeyDrivers => "Key Drivers",
            Self::CreativeInsights => "Creative Insights",
            Self::ChartCommentary => "Chart Commentary",
        }
    }

    /// Anchor id used in the HTML rendering.
    pub fn anchor(self) -> &'static str {
        match self {
            Self::ExecutiveSummary => "executive-summary",
            Self::Trends => "trends",
            Self::Performance => "performance",
            Self::KeyDrivers => "key-drivers",
            Self::CreativeInsights => "creative-insights",
            Self::ChartCommentary => "chart-commentary",
        }
    }

    /// Match a heading to a section. Checked most specific first.
    pub fn from_heading(heading: &str) -> Option<Self> {
        let normalized = normalize_heading(heading);
        let has = |words: &[&str]| words.iter().any(|w| normalized.contains(w));

        if has(&["chart", "visual", "plot", "figure", "graph"]) {
            Some(Self::ChartCommentary)
        } else if has(&["creative", "recommendation", "opportunit"]) {
            Some(Self::CreativeInsights)
        } else if has(&["driver", "factor"]) {
            Some(Self::KeyDrivers)
        } else if has(&["executive", "summary", "overview"]) {
            Some(Self::ExecutiveSummary)
        } else if has(&["trend"]) {
            Some(Self::Trends)
        } else if has(&["performance", "performer", "market", "model", "region"]) {
            Some(Self::Performance)
        } else if has(&["insight"]) {
            Some(Self::CreativeInsights)
        } else {
            None
        }
    }
}

impl fmt::Display for ReportSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

fn normalize_heading(heading: &str) -> String {
    let stripped = heading
        .trim()
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .replace(['*', '_', '`'], "");
    NUMBERING
        .replace(stripped.trim_start(), "")
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

/// The model's answer split into report sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Narrative {
    preamble: String,
    sections: Vec<(ReportSection, String)>,
    degraded: Option<String>,
}

impl Narrative {
    /// Split Markdown text on headings into sections.
    pub fn parse(text: &str) -> Self {
        let mut narrative = Narrative::default();
        let mut preamble: Vec<&str> = Vec::new();
        let mut current: Option<(ReportSection, Vec<&str>)> = None;
        let mut section_level: Option<usize> = None;

        for line in text.lines() {
            let matched = HEADING.captures(line).and_then(|caps| {
                let level = caps.get(1).map_or(0, |m| m.as_str().len());
                if section_level.is_some_and(|top| level > top) {
                    return None;
                }
                let title = caps.get(2).map_or("", |m| m.as_str());
                ReportSection::from_heading(title).map(|section| (section, level))
            });

            match matched {
                Some((section, level)) => {
                    section_level.get_or_insert(level);
                    if let Some((done, lines)) = current.take() {
                        narrative.push(done, &lines.join("\n"));
                    }
                    current = Some((section, Vec::new()));
                }
                None => match current.as_mut() {
                    Some((_, lines)) => lines.push(line),
                    None => preamble.push(line),
                },
            }
        }
        if let Some((done, lines)) = current.take() {
            narrative.push(done, &lines.join("\n"));
        }

        narrative.preamble = preamble.join("\n").trim().to_string();
        debug!(
            matched = narrative.sections.len(),
            preamble_chars = narrative.preamble.len(),
            "Narrative parsed"
        );
        narrative
    }

    /// Stand-in used when the model produced nothing usable.
    pub fn placeholder(reason: impl Into<String>) -> Self {
        Self {
            degraded: Some(reason.into()),
            ..Self::default()
        }
    }

    fn push(&mut self, section: ReportSection, body: &str) {
        let body = body.trim();
        if body.is_empty() {
            return;
        }
        match self.sections.iter_mut().find(|(s, _)| *s == section) {
            Some((_, existing)) => {
                existing.push_str("\n\n");
                existing.push_str(body);
            }
            None => self.sections.push((section, body.to_string())),
        }
    }

    /// Body of a section, if the model wrote one.
    pub fn section(&self, section: ReportSection) -> Option<&str> {
        self.sections
            .iter()
            .find(|(s, _)| *s == section)
            .map(|(_, body)| body.as_str())
    }

    /// Text that preceded the first recognized heading.
    pub fn preamble(&self) -> &str {
        &self.preamble
    }

    pub fn matched_sections(&self) -> usize {
        self.sections.len()
    }

    pub fn missing_sections(&self) -> Vec<ReportSection> {
        ReportSection::ALL
            .into_iter()
            .filter(|s| self.section(*s).is_none())
            .collect()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    /// Why the narrative is a placeholder.
    pub fn degraded_reason(&self) -> Option<&str> {
        self.degraded.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ANSWER: &str = "\
# Automotive Sales Report
Prepared for the board.

## 1. Executive Summary
Sales grew steadily.

## 📈 Sales Trends
Units rose 12% per year.
### Regional detail
Asia led.

## Model and Market Performance
The 3 Series led.

## Key Drivers of Sales
Price sensitivity.

## Creative Insights
Hybrids are under-served.

## Chart Commentary
The regional trend chart shows Asia ahead.
";

    #[test]
    fn test_parses_all_sections() {
        let narrative = Narrative::parse(ANSWER);
        assert_eq!(narrative.matched_sections(), 6);
        assert!(narrative.missing_sections().is_empty());
        assert_eq!(
            narrative.preamble(),
            "# Automotive Sales Report\nPrepared for the board."
        );
        assert_eq!(
            narrative.section(ReportSection::ExecutiveSummary),
            Some("Sales grew steadily.")
        );
        assert_eq!(
            narrative.section(ReportSection::Trends),
            Some("Units rose 12% per year.\n### Regional detail\nAsia led.")
        );
        assert!(!narrative.is_degraded());
    }

    #[test]
    fn test_heading_matching() {
        assert_eq!(
            ReportSection::from_heading("**2) Key Sales Drivers**"),
            Some(ReportSection::KeyDrivers)
        );
        assert_eq!(
            ReportSection::from_heading("IV. Top Performers"),
            Some(ReportSection::Performance)
        );
        assert_eq!(
            ReportSection::from_heading("💡 Insights & Recommendations"),
            Some(ReportSection::CreativeInsights)
        );
        assert_eq!(
            ReportSection::from_heading("Visualizations"),
            Some(ReportSection::ChartCommentary)
        );
        assert_eq!(ReportSection::from_heading("Appendix"), None);
    }

    #[test]
    fn test_missing_sections_reported() {
        let narrative = Narrative::parse("## Executive Summary\nShort.\n\n## Trends\nFlat.");
        assert_eq!(
            narrative.missing_sections(),
            vec![
                ReportSection::Performance,
                ReportSection::KeyDrivers,
                ReportSection::CreativeInsights,
                ReportSection::ChartCommentary,
            ]
        );
    }

    #[test]
    fn test_unstructured_text_is_preamble() {
        let narrative = Narrative::parse("Sales were good this year.");
        assert_eq!(narrative.matched_sections(), 0);
        assert_eq!(narrative.preamble(), "Sales were good this year.");
    }

    #[test]
    fn test_repeated_section_is_appended() {
        let narrative = Narrative::parse("## Trends\nOne.\n## Trends\nTwo.");
        assert_eq!(narrative.section(ReportSection::Trends), Some("One.\n\nTwo."));
    }

    #[test]
    fn test_placeholder() {
        let narrative = Narrative::placeholder("model call failed after 3 attempt(s)");
        assert!(narrative.is_degraded());
        assert_eq!(narrative.missing_sections().len(), 6);
        assert_eq!(
            narrative.degraded_reason(),
            Some("model call failed after 3 attempt(s)")
        );
    }
}

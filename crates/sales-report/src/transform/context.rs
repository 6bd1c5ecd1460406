//! The bounded Markdown context handed to the prompt builder.

use crate::error::{ReportError, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One labeled section of the context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSection {
    /// Stable identifier (e.g. "yearly-totals").
    pub id: String,
    pub heading: String,
    /// Higher survives longer when the budget is tight.
    pub priority: u8,
    /// Markdown body: whole tables or bullet lists.
    pub body: String,
}

impl ContextSection {
    pub fn new(id: &str, heading: &str, priority: u8, body: String) -> Self {
        Self {
            id: id.to_string(),
            heading: heading.to_string(),
            priority,
            body,
        }
    }

    fn render(&self) -> String {
        format!("## {}\n\n{}", self.heading, self.body.trim_end())
    }
}

/// Provenance notes rendered ahead of the sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextMetadata {
    pub source: String,
    pub record_count: usize,
    pub rows_rejected: usize,
    pub year_span: Option<(i32, i32)>,
    pub growth_method: String,
    /// Imputation notes; the values they describe are approximate.
    pub imputation_notes: Vec<String>,
    /// Ids of sections removed to meet the budget.
    pub dropped_sections: Vec<String>,
}

/// Ordered sections plus metadata, rendered within a character budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDocument {
    pub sections: Vec<ContextSection>,
    pub metadata: ContextMetadata,
    text: String,
}

const TITLE: &str = "# Vehicle Sales Data Context";

impl ContextDocument {
    /// Render `sections` in order, dropping whole sections by ascending
    /// priority (later sections first on ties) until the text fits `budget`.
    ///
    /// Fails with `BudgetExceeded` when the title and metadata alone do not fit.
    pub fn assemble(
        sections: Vec<ContextSection>,
        mut metadata: ContextMetadata,
        budget: usize,
    ) -> Result<Self> {
        let mut drop_order: Vec<usize> = (0..sections.len()).collect();
        drop_order.sort_by(|a, b| sections[*a].priority.cmp(&sections[*b].priority).then(b.cmp(a)));
        let mut drop_order = drop_order.into_iter();

        let mut kept = vec![true; sections.len()];
        loop {
            let included: Vec<&ContextSection> = sections
                .iter()
                .zip(&kept)
                .filter_map(|(s, k)| k.then_some(s))
                .collect();
            let text = render(&metadata, &included);
            let size = text.chars().count();
            if size <= budget {
                let sections = sections
                    .into_iter()
                    .zip(kept)
                    .filter_map(|(s, k)| k.then_some(s))
                    .collect();
                return Ok(Self {
                    sections,
                    metadata,
                    text,
                });
            }

            let Some(victim) = drop_order.next() else {
                return Err(ReportError::BudgetExceeded {
                    what: "context header and metadata".to_string(),
                    needed: size,
                    budget,
                });
            };
            warn!(
                section = %sections[victim].id,
                size,
                budget,
                "Context over budget, dropping section"
            );
            kept[victim] = false;
            metadata.dropped_sections.push(sections[victim].id.clone());
        }
    }

    /// The rendered Markdown.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Size in characters.
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    pub fn section(&self, id: &str) -> Option<&ContextSection> {
        self.sections.iter().find(|s| s.id == id)
    }
}

fn render(metadata: &ContextMetadata, sections: &[&ContextSection]) -> String {
    let mut out = String::new();
    out.push_str(TITLE);
    out.push_str("\n\n");
    out.push_str(&format!("- Source: {}\n", metadata.source));
    out.push_str(&format!("- Records analysed: {}\n", metadata.record_count));
    if metadata.rows_rejected > 0 {
        out.push_str(&format!("- Rows excluded by validation: {}\n", metadata.rows_rejected));
    }
    if let Some((first, last)) = metadata.year_span {
        out.push_str(&format!("- Period: {} to {}\n", first, last));
    }
    out.push_str(&format!("- Growth metric: {}\n", metadata.growth_method));
    if !metadata.imputation_notes.is_empty() {
        out.push_str("- Approximate values (imputed):\n");
        for note in &metadata.imputation_notes {
            out.push_str(&format!("  - {}\n", note));
        }
    }
    if !metadata.dropped_sections.is_empty() {
        out.push_str(&format!(
            "- Omitted for length: {}\n",
            metadata.dropped_sections.join(", ")
        ));
    }

    for section in sections {
        out.push('\n');
        out.push_str(&section.render());
        out.push('\n');
    }
    out
}

//! Prompt assembly.

use crate::error::{ReportError, Result};
use crate::transform::ContextDocument;
use serde::Serialize;
use tracing::debug;

const CONTEXT_MARKER: &str = "DATA CONTEXT:";

/// Line breaks between role, task, marker and context, plus the final one.
const SEPARATOR_CHARS: usize = 6;

/// The final text sent to the model. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptPayload {
    system_role: String,
    task: String,
    context: String,
    text: String,
}

impl PromptPayload {
    /// Role instructions.
    pub fn system_role(&self) -> &str {
        &self.system_role
    }

    /// Task instructions followed by the data context.
    pub fn user_message(&self) -> String {
        format!("{}\n\n{}\n{}", self.task, CONTEXT_MARKER, self.context)
    }

    /// Role, task and context in that order.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Concatenates templates and context within a character budget.
#[derive(Debug, Clone, Copy)]
pub struct PromptBuilder {
    max_chars: usize,
}

impl PromptBuilder {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    /// Characters the templates and separators add around the context.
    ///
    /// A context of at most `max_chars - overhead(role, task)` characters
    /// always yields a prompt within budget.
    pub fn overhead(role: &str, task: &str) -> usize {
        role.trim().chars().count() + task.trim().chars().count() + CONTEXT_MARKER.len() + SEPARATOR_CHARS
    }

    /// Build the payload, failing with `BudgetExceeded` if the concatenated
    /// text is longer than the budget.
    pub fn build(&self, context: &ContextDocument, role: &str, task: &str) -> Result<PromptPayload> {
        let role = role.trim();
        let task = task.trim();
        let body = context.text().trim_end();
        let text = format!("{}\n\n{}\n\n{}\n{}\n", role, task, CONTEXT_MARKER, body);

        let size = text.chars().count();
        if size > self.max_chars {
            return Err(ReportError::BudgetExceeded {
                what: "prompt".to_string(),
                needed: size,
                budget: self.max_chars,
            });
        }
        debug!(chars = size, budget = self.max_chars, "Prompt assembled");

        Ok(PromptPayload {
            system_role: role.to_string(),
            task: task.to_string(),
            context: body.to_string(),
            text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{ContextMetadata, ContextSection};

    fn context() -> ContextDocument {
        ContextDocument::assemble(
            vec![ContextSection::new("totals", "Totals", 100, "- 1,000 units".to_string())],
            ContextMetadata::default(),
            10_000,
        )
        .unwrap()
    }

    #[test]
    fn test_order_is_role_task_context() {
        let payload = PromptBuilder::new(10_000)
            .build(&context(), "You are an analyst.", "Write the report.")
            .unwrap();
        let text = payload.text();
        let role = text.find("You are an analyst.").unwrap();
        let task = text.find("Write the report.").unwrap();
        let data = text.find("- 1,000 units").unwrap();
        assert!(role < task && task < data);
        assert_eq!(payload.system_role(), "You are an analyst.");
        assert!(payload.user_message().starts_with("Write the report."));
    }

    #[test]
    fn test_budget_checked_after_concatenation() {
        let ctx = context();
        let role = "r".repeat(50);
        // context alone fits, templates push it over
        let budget = ctx.char_count() + 20;
        let err = PromptBuilder::new(budget).build(&ctx, &role, "task").unwrap_err();
        match err {
            ReportError::BudgetExceeded { what, needed, budget: b } => {
                assert_eq!(what, "prompt");
                assert!(needed > b);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_overhead_is_exact() {
        let ctx = context();
        let role = "  You are an analyst.  ";
        let task = "Write the report.\n";
        let payload = PromptBuilder::new(10_000).build(&ctx, role, task).unwrap();
        let body = ctx.text().trim_end().chars().count();
        assert_eq!(payload.char_count(), PromptBuilder::overhead(role, task) + body);

        // exactly at the limit still fits
        let tight = PromptBuilder::overhead(role, task) + body;
        assert!(PromptBuilder::new(tight).build(&ctx, role, task).is_ok());
    }

    #[test]
    fn test_payload_within_budget() {
        let payload = PromptBuilder::new(10_000).build(&context(), "role", "task").unwrap();
        assert!(payload.char_count() <= 10_000);
    }
}

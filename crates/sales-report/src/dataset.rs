//! The validated, imputed dataset shared by the transformer and the visualizer.

use crate::schema::Record;
use crate::transform::ImputationSummary;
use serde::{Deserialize, Serialize};

/// Provenance and quality information carried alongside the records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetMeta {
    /// Path or label of the input table.
    pub source: String,
    /// Rows in the raw input.
    pub rows_in: usize,
    /// Rows dropped by validation.
    pub rows_rejected: usize,
    /// Number of recorded validation violations.
    pub violation_count: usize,
    /// Whether validation stayed within the tolerated drop ratio.
    pub validation_passed: bool,
    /// What imputation did to the surviving rows.
    pub imputation: ImputationSummary,
}

/// An ordered, immutable collection of [`Record`]s for one run.
///
/// There is no mutable access: every consumer borrows the same instance so
/// the narrative context and the charts are computed from identical rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    records: Vec<Record>,
    meta: DatasetMeta,
}

impl Dataset {
    pub(crate) fn new(records: Vec<Record>, meta: DatasetMeta) -> Self {
        Self { records, meta }
    }

    /// Build a dataset from records that need no validation (tests, embedding).
    pub fn from_records(records: Vec<Record>, source: impl Into<String>) -> Self {
        let meta = DatasetMeta {
            source: source.into(),
            rows_in: records.len(),
            validation_passed: true,
            ..DatasetMeta::default()
        };
        Self { records, meta }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn meta(&self) -> &DatasetMeta {
        &self.meta
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether any record carries a color.
    pub fn has_color(&self) -> bool {
        self.records.iter().any(|r| r.color.is_some())
    }

    /// Whether any record carries a mileage.
    pub fn has_mileage(&self) -> bool {
        self.records.iter().any(|r| r.mileage_km.is_some())
    }

    /// First and last year covered, if any.
    pub fn year_span(&self) -> Option<(i32, i32)> {
        let min = self.records.iter().map(|r| r.year).min()?;
        let max = self.records.iter().map(|r| r.year).max()?;
        Some((min, max))
    }
}

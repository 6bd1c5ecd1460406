//! Tabular-to-text transformation.
//!
//! Two steps, both deterministic:
//!
//! 1. [`Transformer::impute`] turns validated rows into a complete [`Dataset`]
//!    according to the [`ImputationPolicy`]. The dataset is then shared,
//!    read-only, with the visualizer.
//! 2. [`Transformer::transform`] aggregates the dataset into prioritized
//!    Markdown sections and renders them within the character budget.

pub mod context;
pub mod impute;
pub mod sections;

pub use context::{ContextDocument, ContextMetadata, ContextSection};
pub use impute::{FieldImputation, FieldPolicy, IMPUTABLE_FIELDS, ImputationPolicy, ImputationSummary};
pub use sections::SectionBuilder;

use crate::analysis::{Analyzer, BinSpec, GrowthMethod};
use crate::dataset::{Dataset, DatasetMeta};
use crate::error::{ReportError, Result};
use crate::validator::ValidatedTable;
use tracing::info;

/// Settings consumed by the [`Transformer`].
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOptions {
    pub imputation: ImputationPolicy,
    pub engine_bins: BinSpec,
    pub mileage_bins: BinSpec,
    pub top_n: usize,
    pub growth_method: GrowthMethod,
    /// Maximum characters of the rendered context.
    pub char_budget: usize,
    /// Fewer records than this is insufficient data.
    pub min_rows: usize,
}

impl Default for TransformOptions {
    fn default() -> Self {
        crate::config::ReportConfig::default().transform_options()
    }
}

/// Converts validated data into a [`ContextDocument`].
#[derive(Debug, Clone)]
pub struct Transformer {
    options: TransformOptions,
}

impl Transformer {
    pub fn new(options: TransformOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TransformOptions {
        &self.options
    }

    /// Fill or remove missing numeric values and freeze the result.
    pub fn impute(&self, table: ValidatedTable) -> Result<Dataset> {
        let (records, summary) = impute::impute(table.observations, &self.options.imputation);
        let meta = DatasetMeta {
            source: table.source,
            rows_in: table.rows_in,
            rows_rejected: table.rows_rejected,
            violation_count: table.violation_count,
            validation_passed: table.passed,
            imputation: summary,
        };
        let dataset = Dataset::new(records, meta);
        self.ensure_sufficient(&dataset)?;
        Ok(dataset)
    }

    fn ensure_sufficient(&self, dataset: &Dataset) -> Result<()> {
        if dataset.is_empty() {
            return Err(ReportError::InsufficientData(
                "no records left after validation and imputation".to_string(),
            ));
        }
        if dataset.len() < self.options.min_rows {
            return Err(ReportError::InsufficientData(format!(
                "{} records left, at least {} required",
                dataset.len(),
                self.options.min_rows
            )));
        }
        Ok(())
    }

    /// Aggregate `dataset` into a context document within the budget.
    pub fn transform(&self, dataset: &Dataset) -> Result<ContextDocument> {
        self.ensure_sufficient(dataset)?;

        let analyzer = Analyzer::new(dataset, &self.options.engine_bins, &self.options.mileage_bins);
        let metric = self.options.growth_method.metric();
        let sections = SectionBuilder::new(analyzer, metric.as_ref(), self.options.top_n).build();

        let meta = dataset.meta();
        let metadata = ContextMetadata {
            source: meta.source.clone(),
            record_count: dataset.len(),
            rows_rejected: meta.rows_rejected + meta.imputation.rows_removed,
            year_span: dataset.year_span(),
            growth_method: metric.label().to_string(),
            imputation_notes: meta.imputation.notes(),
            dropped_sections: Vec::new(),
        };

        let document = ContextDocument::assemble(sections, metadata, self.options.char_budget)?;
        info!(
            sections = document.sections.len(),
            dropped = document.metadata.dropped_sections.len(),
            chars = document.char_count(),
            budget = self.options.char_budget,
            "Context document built"
        );
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FuelType, Observation, Region, Transmission};
    use crate::testing::sample_dataset;

    fn table(observations: Vec<Observation>) -> ValidatedTable {
        ValidatedTable {
            rows_in: observations.len(),
            observations,
            source: "test.csv".to_string(),
            rows_rejected: 0,
            violation_count: 0,
            passed: true,
            warnings: Vec::new(),
        }
    }

    fn observation(row: usize, price: Option<f64>) -> Observation {
        Observation {
            row,
            region: Region::Asia,
            model: "X3".to_string(),
            year: 2020 + row as i32,
            fuel_type: FuelType::Diesel,
            transmission: Transmission::Automatic,
            engine_size_l: Some(2.0),
            sales_volume: Some(100),
            price_usd: price,
            color: None,
            mileage_km: None,
        }
    }

    #[test]
    fn test_empty_table_is_insufficient() {
        let err = Transformer::new(TransformOptions::default())
            .impute(table(Vec::new()))
            .unwrap_err();
        assert_eq!(err.error_code(), "INSUFFICIENT_DATA");
    }

    #[test]
    fn test_min_rows_enforced() {
        let options = TransformOptions {
            min_rows: 5,
            ..TransformOptions::default()
        };
        let err = Transformer::new(options)
            .impute(table(vec![observation(0, Some(1.0))]))
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_imputation_notes_reach_context_metadata() {
        let transformer = Transformer::new(TransformOptions::default());
        let dataset = transformer
            .impute(table(vec![
                observation(0, Some(40_000.0)),
                observation(1, None),
                observation(2, Some(50_000.0)),
            ]))
            .unwrap();
        assert_eq!(dataset.meta().imputation.approximate_rows, vec![1]);

        let doc = transformer.transform(&dataset).unwrap();
        assert_eq!(doc.metadata.imputation_notes.len(), 1);
        assert!(doc.text().contains("Approximate values (imputed)"));
        assert!(doc.text().contains("price_usd: 1 value(s) approximated by group mean by region+model"));
    }

    #[test]
    fn test_context_respects_budget() {
        let dataset = sample_dataset();
        let full = Transformer::new(TransformOptions::default())
            .transform(&dataset)
            .unwrap();
        assert!(full.metadata.dropped_sections.is_empty());

        let budget = full.char_count() / 2;
        let options = TransformOptions {
            char_budget: budget,
            ..TransformOptions::default()
        };
        let doc = Transformer::new(options).transform(&dataset).unwrap();
        assert!(doc.char_count() <= budget);
        assert_eq!(doc.metadata.dropped_sections[0], sections::SECTION_CORRELATIONS);
        assert!(doc.section(sections::SECTION_OVERVIEW).is_some());
    }

    #[test]
    fn test_transform_is_deterministic() {
        let dataset = sample_dataset();
        let transformer = Transformer::new(TransformOptions::default());
        let a = transformer.transform(&dataset).unwrap();
        let b = transformer.transform(&dataset).unwrap();
        assert_eq!(a.text(), b.text());
    }
}

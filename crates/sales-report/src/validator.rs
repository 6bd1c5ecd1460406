//! Declarative row validation.
//!
//! Rules are data ([`ValidationRules`]) and are applied cell by cell. A row with
//! any violation is dropped once and every violation it produced is recorded.
//! The run is only unusable when a required column is missing or the share of
//! dropped rows exceeds `max_drop_ratio`.

use crate::error::{Result, ResultExt};
use crate::schema::{
    COL_COLOR, COL_ENGINE_SIZE, COL_FUEL_TYPE, COL_MILEAGE, COL_MODEL, COL_PRICE, COL_REGION,
    COL_SALES_VOLUME, COL_TRANSMISSION, COL_YEAR, FuelType, Observation, Region, Transmission,
};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Rule name: a required column is absent from the table.
pub const RULE_REQUIRED_COLUMN: &str = "required-column";
/// Rule name: a non-nullable cell is empty.
pub const RULE_PRESENT: &str = "present";
/// Rule name: a cell cannot be coerced to its semantic type.
pub const RULE_TYPE: &str = "type";
/// Rule name: a numeric cell is negative.
pub const RULE_NON_NEGATIVE: &str = "non-negative";
/// Rule name: a cell is outside its declared value set.
pub const RULE_ALLOWED_VALUES: &str = "allowed-values";
/// Rule name: a numeric cell is outside its inclusive range.
pub const RULE_RANGE: &str = "range";

/// Semantic type a column must be coercible to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Integer,
    Float,
    Text,
}

/// Validation rule for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRule {
    pub name: String,
    pub semantic: SemanticType,
    /// The column must exist in the table.
    #[serde(default)]
    pub required_column: bool,
    /// Empty cells are accepted (and left for imputation).
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub non_negative: bool,
    /// Accepted values, compared case-insensitively. `None` accepts anything.
    #[serde(default)]
    pub allowed: Option<Vec<String>>,
    /// Inclusive numeric range.
    #[serde(default)]
    pub range: Option<(f64, f64)>,
}

impl ColumnRule {
    fn new(name: &str, semantic: SemanticType) -> Self {
        Self {
            name: name.to_string(),
            semantic,
            required_column: true,
            nullable: false,
            non_negative: false,
            allowed: None,
            range: None,
        }
    }

    fn optional_column(mut self) -> Self {
        self.required_column = false;
        self.nullable = true;
        self
    }

    fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    fn non_negative(mut self) -> Self {
        self.non_negative = true;
        self
    }

    fn allowed(mut self, values: Vec<String>) -> Self {
        self.allowed = Some(values);
        self
    }

    fn range(mut self, low: f64, high: f64) -> Self {
        self.range = Some((low, high));
        self
    }
}

/// The full rule set plus run-level thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationRules {
    pub columns: Vec<ColumnRule>,
    /// Highest tolerated share of dropped rows (0.0 - 1.0).
    /// Default: 0.2
    pub max_drop_ratio: f64,
    /// Minimum number of records needed after validation and imputation.
    /// Default: 1
    pub min_rows: usize,
    /// Prices outside this range are reported as a warning, not a violation.
    pub price_warning_range: Option<(f64, f64)>,
    /// Text columns with more distinct values than this share of rows are
    /// reported as possibly dirty.
    /// Default: 0.5
    pub high_cardinality_ratio: f64,
    /// Columns missing in more than this share of rows are reported.
    /// Default: 0.5
    pub missing_value_warning_ratio: f64,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            columns: vec![
                ColumnRule::new(COL_REGION, SemanticType::Text).allowed(Region::labels()),
                ColumnRule::new(COL_MODEL, SemanticType::Text),
                ColumnRule::new(COL_YEAR, SemanticType::Integer).range(2020.0, 2024.0),
                ColumnRule::new(COL_FUEL_TYPE, SemanticType::Text).allowed(FuelType::labels()),
                ColumnRule::new(COL_TRANSMISSION, SemanticType::Text)
                    .allowed(Transmission::labels()),
                ColumnRule::new(COL_ENGINE_SIZE, SemanticType::Float)
                    .nullable()
                    .non_negative(),
                ColumnRule::new(COL_SALES_VOLUME, SemanticType::Integer)
                    .nullable()
                    .non_negative(),
                ColumnRule::new(COL_PRICE, SemanticType::Float)
                    .nullable()
                    .non_negative(),
                ColumnRule::new(COL_COLOR, SemanticType::Text).optional_column(),
                ColumnRule::new(COL_MILEAGE, SemanticType::Float)
                    .optional_column()
                    .non_negative(),
            ],
            max_drop_ratio: 0.2,
            min_rows: 1,
            price_warning_range: Some((10_000.0, 800_000.0)),
            high_cardinality_ratio: 0.5,
            missing_value_warning_ratio: 0.5,
        }
    }
}

impl ValidationRules {
    /// Restrict `model` to a fixed catalog.
    pub fn with_model_catalog(mut self, models: Vec<String>) -> Self {
        if let Some(rule) = self.columns.iter_mut().find(|r| r.name == COL_MODEL) {
            rule.allowed = if models.is_empty() { None } else { Some(models) };
        }
        self
    }

    /// Replace the inclusive year range.
    pub fn with_year_range(mut self, low: i32, high: i32) -> Self {
        if let Some(rule) = self.columns.iter_mut().find(|r| r.name == COL_YEAR) {
            rule.range = Some((low as f64, high as f64));
        }
        self
    }
}

/// One recorded rule violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Zero-based row index; `None` for table-level violations.
    pub row: Option<usize>,
    pub field: String,
    pub rule: String,
    pub message: String,
}

/// Verdict of a validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub ok: bool,
    /// Ordered by row index, then by column rule order.
    pub violations: Vec<Violation>,
    pub rows_in: usize,
    pub rows_kept: usize,
    pub drop_ratio: f64,
}

impl ValidationResult {
    pub fn rows_dropped(&self) -> usize {
        self.rows_in - self.rows_kept
    }

    /// Number of violations reported under `rule`.
    pub fn count_rule(&self, rule: &str) -> usize {
        self.violations.iter().filter(|v| v.rule == rule).count()
    }
}

/// Rows that passed validation, ready for imputation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedTable {
    pub observations: Vec<Observation>,
    pub source: String,
    pub rows_in: usize,
    pub rows_rejected: usize,
    pub violation_count: usize,
    pub passed: bool,
    /// Non-fatal data quality notes (duplicates, suspicious prices, ...).
    pub warnings: Vec<String>,
}

/// Everything produced by [`Validator::validate`].
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub result: ValidationResult,
    pub observations: Vec<Observation>,
    pub warnings: Vec<String>,
}

impl ValidationOutcome {
    /// Package the kept rows with their provenance.
    pub fn into_table(self, source: impl Into<String>) -> ValidatedTable {
        ValidatedTable {
            source: source.into(),
            rows_in: self.result.rows_in,
            rows_rejected: self.result.rows_dropped(),
            violation_count: self.result.violations.len(),
            passed: self.result.ok,
            observations: self.observations,
            warnings: self.warnings,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Missing,
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Integer(v) => Some(*v as f64),
            Cell::Float(v) => Some(*v),
            _ => None,
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Applies [`ValidationRules`] to a raw table.
pub struct Validator {
    rules: ValidationRules,
}

impl Validator {
    pub fn new(rules: ValidationRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &ValidationRules {
        &self.rules
    }

    /// Validate every row of `df`.
    ///
    /// Only a table that cannot be read column-wise is an `Err`; everything
    /// else is reported in the returned [`ValidationResult`].
    pub fn validate(&self, df: &DataFrame) -> Result<ValidationOutcome> {
        let rows_in = df.height();
        let mut violations = Vec::new();

        let mut columns: Vec<(&ColumnRule, Option<Vec<Option<String>>>)> = Vec::new();
        for rule in &self.rules.columns {
            if df.get_column_index(&rule.name).is_some() {
                columns.push((rule, Some(string_cells(df, &rule.name)?)));
            } else {
                if rule.required_column {
                    violations.push(Violation {
                        row: None,
                        field: rule.name.clone(),
                        rule: RULE_REQUIRED_COLUMN.to_string(),
                        message: format!("required column '{}' is missing", rule.name),
                    });
                }
                columns.push((rule, None));
            }
        }

        if !violations.is_empty() {
            for v in &violations {
                warn!(field = %v.field, rule = %v.rule, "{}", v.message);
            }
            return Ok(ValidationOutcome {
                result: ValidationResult {
                    ok: false,
                    violations,
                    rows_in,
                    rows_kept: 0,
                    drop_ratio: if rows_in == 0 { 0.0 } else { 1.0 },
                },
                observations: Vec::new(),
                warnings: Vec::new(),
            });
        }

        let mut observations = Vec::with_capacity(rows_in);
        for row in 0..rows_in {
            let before = violations.len();
            let mut parsed: HashMap<&str, Cell> = HashMap::new();

            for (rule, cells) in &columns {
                let Some(cells) = cells else { continue };
                let raw = cells[row].as_deref();
                if let Some(cell) = check_cell(rule, row, raw, &mut violations) {
                    parsed.insert(rule.name.as_str(), cell);
                }
            }

            if violations.len() == before
                && let Some(obs) = build_observation(row, &parsed, &mut violations)
            {
                observations.push(obs);
            }
        }

        for v in &violations {
            debug!(row = ?v.row, field = %v.field, rule = %v.rule, "{}", v.message);
        }

        let rows_kept = observations.len();
        let dropped = rows_in - rows_kept;
        let drop_ratio = if rows_in == 0 {
            0.0
        } else {
            dropped as f64 / rows_in as f64
        };
        let ok = drop_ratio <= self.rules.max_drop_ratio;

        if dropped > 0 {
            warn!(
                dropped,
                rows_in,
                violations = violations.len(),
                "Dropped {:.1}% of rows during validation",
                drop_ratio * 100.0
            );
        }

        let mut warnings = Vec::new();
        if dropped > 0 {
            warnings.push(format!(
                "{} of {} rows failed validation and were excluded",
                dropped, rows_in
            ));
        }
        warnings.extend(self.quality_warnings(df, &columns, &observations));
        for w in &warnings {
            warn!("{}", w);
        }

        info!(
            rows_in,
            rows_kept,
            ok,
            "Validation complete: {} violations, {} warnings",
            violations.len(),
            warnings.len()
        );

        Ok(ValidationOutcome {
            result: ValidationResult {
                ok,
                violations,
                rows_in,
                rows_kept,
                drop_ratio,
            },
            observations,
            warnings,
        })
    }

    fn quality_warnings(
        &self,
        df: &DataFrame,
        columns: &[(&ColumnRule, Option<Vec<Option<String>>>)],
        observations: &[Observation],
    ) -> Vec<String> {
        let mut warnings = Vec::new();
        let rows = df.height();

        let mut seen = HashSet::new();
        let mut duplicates = 0usize;
        for row in 0..rows {
            let key: Vec<Option<&str>> = columns
                .iter()
                .filter_map(|(_, cells)| cells.as_ref().map(|c| c[row].as_deref()))
                .collect();
            if !seen.insert(key) {
                duplicates += 1;
            }
        }
        if duplicates > 0 {
            warnings.push(format!("Found {} duplicate rows", duplicates));
        }

        if let Some((low, high)) = self.rules.price_warning_range {
            let unusual = observations
                .iter()
                .filter_map(|o| o.price_usd)
                .filter(|p| *p < low || *p > high)
                .count();
            if unusual > 0 {
                warnings.push(format!(
                    "Found {} rows with unusual prices (< ${:.0} or > ${:.0})",
                    unusual, low, high
                ));
            }
        }

        if rows > 0 {
            for (rule, cells) in columns {
                let Some(cells) = cells else { continue };
                let missing = cells
                    .iter()
                    .filter(|c| c.as_deref().is_none_or(|v| v.trim().is_empty()))
                    .count();
                let share = missing as f64 / rows as f64;
                if share > self.rules.missing_value_warning_ratio {
                    warnings.push(format!(
                        "{} is missing in {} of {} rows ({:.0}%)",
                        rule.name,
                        missing,
                        rows,
                        share * 100.0
                    ));
                }
            }
        }

        // cardinality is meaningless on tiny tables
        if rows >= 20 {
            for (rule, cells) in columns {
                let (SemanticType::Text, Some(cells)) = (rule.semantic, cells) else {
                    continue;
                };
                let distinct: HashSet<&str> = cells.iter().filter_map(|c| c.as_deref()).collect();
                if distinct.len() as f64 > rows as f64 * self.rules.high_cardinality_ratio {
                    warnings.push(format!(
                        "{} has high cardinality ({} unique values) - check for typos",
                        rule.name,
                        distinct.len()
                    ));
                }
            }
        }

        warnings
    }
}

fn string_cells(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df
        .column(name)
        .context(format!("Failed to read column '{}'", name))?
        .cast(&DataType::String)
        .context(format!("Failed to read column '{}' as text", name))?;
    let values = column
        .str()
        .context(format!("Column '{}' is not textual", name))?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect();
    Ok(values)
}

fn violation(row: usize, rule: &ColumnRule, name: &str, message: String) -> Violation {
    Violation {
        row: Some(row),
        field: rule.name.clone(),
        rule: name.to_string(),
        message,
    }
}

/// Check one cell against its rule, recording every violation.
///
/// Returns the parsed cell when it passed.
fn check_cell(
    rule: &ColumnRule,
    row: usize,
    raw: Option<&str>,
    violations: &mut Vec<Violation>,
) -> Option<Cell> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty());
    let Some(raw) = raw else {
        if rule.nullable {
            return Some(Cell::Missing);
        }
        violations.push(violation(
            row,
            rule,
            RULE_PRESENT,
            format!("row {}: '{}' is empty", row, rule.name),
        ));
        return None;
    };

    let cell = match rule.semantic {
        SemanticType::Text => Cell::Text(raw.to_string()),
        SemanticType::Integer => match parse_integer(raw) {
            Some(v) => Cell::Integer(v),
            None => {
                violations.push(violation(
                    row,
                    rule,
                    RULE_TYPE,
                    format!("row {}: '{}' value '{}' is not an integer", row, rule.name, raw),
                ));
                return None;
            }
        },
        SemanticType::Float => match raw.parse::<f64>().ok().filter(|v| v.is_finite()) {
            Some(v) => Cell::Float(v),
            None => {
                violations.push(violation(
                    row,
                    rule,
                    RULE_TYPE,
                    format!("row {}: '{}' value '{}' is not a number", row, rule.name, raw),
                ));
                return None;
            }
        },
    };

    let before = violations.len();
    if let Some(value) = cell.as_f64() {
        if rule.non_negative && value < 0.0 {
            violations.push(violation(
                row,
                rule,
                RULE_NON_NEGATIVE,
                format!("row {}: '{}' is negative ({})", row, rule.name, raw),
            ));
        }
        if let Some((low, high)) = rule.range
            && (value < low || value > high)
        {
            violations.push(violation(
                row,
                rule,
                RULE_RANGE,
                format!(
                    "row {}: '{}' value {} is outside {}..={}",
                    row, rule.name, raw, low, high
                ),
            ));
        }
    }
    if let Some(allowed) = &rule.allowed
        && !allowed.iter().any(|a| a.trim().eq_ignore_ascii_case(raw))
    {
        violations.push(violation(
            row,
            rule,
            RULE_ALLOWED_VALUES,
            format!("row {}: '{}' value '{}' is not allowed", row, rule.name, raw),
        ));
    }

    (violations.len() == before).then_some(cell)
}

fn parse_integer(raw: &str) -> Option<i64> {
    if let Ok(v) = raw.parse::<i64>() {
        return Some(v);
    }
    // "2021.0" as written by spreadsheet exports
    let v = raw.parse::<f64>().ok()?;
    (v.is_finite() && v.fract() == 0.0).then_some(v as i64)
}

fn calendar_year(value: f64) -> Option<i32> {
    if !value.is_finite() || value.fract() != 0.0 {
        return None;
    }
    i32::try_from(value as i64).ok()
}

/// Turn a fully checked row into an [`Observation`].
///
/// Core schema fields are required here even if the rule set forgot them.
fn build_observation(
    row: usize,
    cells: &HashMap<&str, Cell>,
    violations: &mut Vec<Violation>,
) -> Option<Observation> {
    let before = violations.len();
    let mut missing = |field: &str, rule: &str, message: String| {
        violations.push(Violation {
            row: Some(row),
            field: field.to_string(),
            rule: rule.to_string(),
            message,
        });
    };

    let text = |field: &str| cells.get(field).and_then(Cell::as_text);
    let number = |field: &str| cells.get(field).and_then(Cell::as_f64);

    let region = match text(COL_REGION).map(str::parse::<Region>) {
        Some(Ok(r)) => Some(r),
        Some(Err(e)) => {
            missing(COL_REGION, RULE_ALLOWED_VALUES, format!("row {}: region {}", row, e));
            None
        }
        None => {
            missing(COL_REGION, RULE_PRESENT, format!("row {}: 'region' is empty", row));
            None
        }
    };
    let fuel_type = match text(COL_FUEL_TYPE).map(str::parse::<FuelType>) {
        Some(Ok(f)) => Some(f),
        Some(Err(e)) => {
            missing(COL_FUEL_TYPE, RULE_ALLOWED_VALUES, format!("row {}: fuel_type {}", row, e));
            None
        }
        None => {
            missing(COL_FUEL_TYPE, RULE_PRESENT, format!("row {}: 'fuel_type' is empty", row));
            None
        }
    };
    let transmission = match text(COL_TRANSMISSION).map(str::parse::<Transmission>) {
        Some(Ok(t)) => Some(t),
        Some(Err(e)) => {
            missing(
                COL_TRANSMISSION,
                RULE_ALLOWED_VALUES,
                format!("row {}: transmission {}", row, e),
            );
            None
        }
        None => {
            missing(
                COL_TRANSMISSION,
                RULE_PRESENT,
                format!("row {}: 'transmission' is empty", row),
            );
            None
        }
    };
    let model = text(COL_MODEL).map(str::to_string);
    if model.is_none() {
        missing(COL_MODEL, RULE_PRESENT, format!("row {}: 'model' is empty", row));
    }
    let year = match number(COL_YEAR) {
        Some(y) => {
            let year = calendar_year(y);
            if year.is_none() {
                missing(COL_YEAR, RULE_TYPE, format!("row {}: year {} is not a calendar year", row, y));
            }
            year
        }
        None => {
            missing(COL_YEAR, RULE_PRESENT, format!("row {}: 'year' is empty", row));
            None
        }
    };

    if violations.len() != before {
        return None;
    }

    Some(Observation {
        row,
        region: region?,
        model: model?,
        year: year?,
        fuel_type: fuel_type?,
        transmission: transmission?,
        engine_size_l: number(COL_ENGINE_SIZE),
        sales_volume: number(COL_SALES_VOLUME).map(|v| v as u64),
        price_usd: number(COL_PRICE),
        color: text(COL_COLOR).map(str::to_string),
        mileage_km: number(COL_MILEAGE),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sales_frame(units: &[&str]) -> DataFrame {
        let n = units.len();
        let regions: Vec<&str> = (0..n).map(|i| if i % 2 == 0 { "Asia" } else { "Europe" }).collect();
        df!(
            "region" => regions,
            "model" => vec!["X3"; n],
            "year" => vec!["2022"; n],
            "fuel_type" => vec!["Petrol"; n],
            "transmission" => vec!["Manual"; n],
            "engine_size_l" => vec!["2.0"; n],
            "sales_volume" => units.to_vec(),
            "price_usd" => vec!["45000"; n]
        )
        .unwrap()
    }

    #[test]
    fn test_negative_sales_rows_dropped() {
        let df = sales_frame(&["10", "20", "-3", "40", "50", "60", "-7", "80", "90", "100"]);
        let outcome = Validator::new(ValidationRules::default()).validate(&df).unwrap();

        assert_eq!(outcome.result.rows_in, 10);
        assert_eq!(outcome.result.rows_kept, 8);
        assert_eq!(outcome.observations.len(), 8);
        assert_eq!(outcome.result.violations.len(), 2);
        assert_eq!(outcome.result.count_rule(RULE_NON_NEGATIVE), 2);
        assert_eq!(outcome.result.violations[0].row, Some(2));
        assert_eq!(outcome.result.violations[1].row, Some(6));
        assert!(outcome.result.ok);
    }

    #[test]
    fn test_missing_required_column_fails_run() {
        let df = sales_frame(&["1", "2"]).drop("price_usd").unwrap();
        let outcome = Validator::new(ValidationRules::default()).validate(&df).unwrap();

        assert!(!outcome.result.ok);
        assert_eq!(outcome.result.rows_kept, 0);
        assert_eq!(outcome.result.violations.len(), 1);
        let v = &outcome.result.violations[0];
        assert_eq!(v.row, None);
        assert_eq!(v.field, "price_usd");
        assert_eq!(v.rule, RULE_REQUIRED_COLUMN);
    }

    #[test]
    fn test_drop_ratio_above_threshold_not_ok() {
        let df = sales_frame(&["-1", "-2", "3", "4"]);
        let outcome = Validator::new(ValidationRules::default()).validate(&df).unwrap();
        assert_eq!(outcome.result.rows_kept, 2);
        assert_eq!(outcome.result.drop_ratio, 0.5);
        assert!(!outcome.result.ok);
    }

    #[test]
    fn test_every_violation_of_a_row_is_recorded() {
        let df = df!(
            "region" => ["Atlantis"],
            "model" => ["X3"],
            "year" => ["1999"],
            "fuel_type" => ["Petrol"],
            "transmission" => ["Manual"],
            "engine_size_l" => ["abc"],
            "sales_volume" => ["5"],
            "price_usd" => ["-1"]
        )
        .unwrap();
        let outcome = Validator::new(ValidationRules::default()).validate(&df).unwrap();
        let rules: Vec<&str> = outcome.result.violations.iter().map(|v| v.rule.as_str()).collect();
        assert_eq!(rules, vec![RULE_ALLOWED_VALUES, RULE_RANGE, RULE_TYPE, RULE_NON_NEGATIVE]);
        assert_eq!(outcome.result.rows_kept, 0);
    }

    #[test]
    fn test_nullable_numeric_deferred_to_imputation() {
        let df = df!(
            "region" => ["Asia"],
            "model" => ["i3"],
            "year" => ["2021"],
            "fuel_type" => ["electric"],
            "transmission" => ["AUTOMATIC"],
            "engine_size_l" => [None::<&str>],
            "sales_volume" => ["12"],
            "price_usd" => [""]
        )
        .unwrap();
        let outcome = Validator::new(ValidationRules::default()).validate(&df).unwrap();
        assert!(outcome.result.violations.is_empty());
        let obs = &outcome.observations[0];
        assert_eq!(obs.fuel_type, FuelType::Electric);
        assert_eq!(obs.transmission, Transmission::Automatic);
        assert_eq!(obs.engine_size_l, None);
        assert_eq!(obs.price_usd, None);
        assert_eq!(obs.sales_volume, Some(12));
    }

    #[test]
    fn test_empty_categorical_is_present_violation() {
        let df = df!(
            "region" => [None::<&str>],
            "model" => ["i3"],
            "year" => ["2021"],
            "fuel_type" => ["Electric"],
            "transmission" => ["Automatic"],
            "engine_size_l" => ["0"],
            "sales_volume" => ["12"],
            "price_usd" => ["40000"]
        )
        .unwrap();
        let outcome = Validator::new(ValidationRules::default()).validate(&df).unwrap();
        assert_eq!(outcome.result.count_rule(RULE_PRESENT), 1);
    }

    #[test]
    fn test_integer_accepts_whole_floats() {
        assert_eq!(parse_integer("2021"), Some(2021));
        assert_eq!(parse_integer("2021.0"), Some(2021));
        assert_eq!(parse_integer("2021.5"), None);
        assert_eq!(parse_integer("x"), None);
    }

    #[test]
    fn test_out_of_range_year_is_type_violation() {
        let mut rules = ValidationRules::default();
        if let Some(rule) = rules.columns.iter_mut().find(|r| r.name == COL_YEAR) {
            rule.range = None;
        }
        let df = df!(
            "region" => ["Asia", "Europe"],
            "model" => ["i3", "X3"],
            "year" => ["99999999999", "2021"],
            "fuel_type" => ["Electric", "Diesel"],
            "transmission" => ["Automatic", "Manual"],
            "engine_size_l" => ["0", "2.0"],
            "sales_volume" => ["12", "30"],
            "price_usd" => ["40000", "48000"]
        )
        .unwrap();
        let outcome = Validator::new(rules).validate(&df).unwrap();

        assert_eq!(outcome.result.count_rule(RULE_TYPE), 1);
        assert_eq!(outcome.result.violations[0].field, COL_YEAR);
        assert_eq!(outcome.result.violations[0].row, Some(0));
        assert_eq!(outcome.observations.len(), 1);
        assert_eq!(outcome.observations[0].year, 2021);
    }

    #[test]
    fn test_calendar_year_bounds() {
        assert_eq!(calendar_year(2022.0), Some(2022));
        assert_eq!(calendar_year(i32::MAX as f64 + 1.0), None);
        assert_eq!(calendar_year(f64::NAN), None);
        assert_eq!(calendar_year(2021.5), None);
    }

    #[test]
    fn test_mostly_missing_column_warns() {
        let df = df!(
            "region" => ["Asia", "Europe", "Asia", "Europe"],
            "model" => ["i3", "X3", "i3", "X3"],
            "year" => ["2021", "2021", "2022", "2022"],
            "fuel_type" => ["Electric", "Diesel", "Electric", "Diesel"],
            "transmission" => ["Automatic", "Manual", "Automatic", "Manual"],
            "engine_size_l" => ["0", "2.0", "0", "2.0"],
            "sales_volume" => ["12", "30", "14", "28"],
            "price_usd" => [Some("40000"), None, Some(""), None]
        )
        .unwrap();

        let outcome = Validator::new(ValidationRules::default()).validate(&df).unwrap();
        let missing: Vec<&String> = outcome.warnings.iter().filter(|w| w.contains("missing in")).collect();
        assert_eq!(missing.len(), 1);
        assert!(missing[0].starts_with("price_usd is missing in 3 of 4 rows"));

        let mut lenient = ValidationRules::default();
        lenient.missing_value_warning_ratio = 0.8;
        let outcome = Validator::new(lenient).validate(&df).unwrap();
        assert!(!outcome.warnings.iter().any(|w| w.contains("missing in")));
    }

    #[test]
    fn test_half_missing_column_does_not_warn() {
        let df = df!(
            "region" => ["Asia", "Europe"],
            "model" => ["i3", "X3"],
            "year" => ["2021", "2022"],
            "fuel_type" => ["Electric", "Diesel"],
            "transmission" => ["Automatic", "Manual"],
            "engine_size_l" => [None::<&str>, Some("2.0")],
            "sales_volume" => ["12", "30"],
            "price_usd" => ["40000", "48000"]
        )
        .unwrap();
        let outcome = Validator::new(ValidationRules::default()).validate(&df).unwrap();
        assert!(!outcome.warnings.iter().any(|w| w.contains("missing in")));
    }

    #[test]
    fn test_model_catalog() {
        let rules = ValidationRules::default().with_model_catalog(vec!["X5".to_string()]);
        let outcome = Validator::new(rules).validate(&sales_frame(&["1"])).unwrap();
        assert_eq!(outcome.result.count_rule(RULE_ALLOWED_VALUES), 1);
    }

    #[test]
    fn test_duplicate_rows_warn() {
        let outcome = Validator::new(ValidationRules::default())
            .validate(&sales_frame(&["5", "6", "5"]))
            .unwrap();
        assert!(outcome.warnings.iter().any(|w| w.contains("1 duplicate")));
    }

    #[test]
    fn test_into_table_carries_counts() {
        let df = sales_frame(&["10", "-1", "30", "40", "50"]);
        let table = Validator::new(ValidationRules::default())
            .validate(&df)
            .unwrap()
            .into_table("sales.csv");
        assert_eq!(table.source, "sales.csv");
        assert_eq!(table.rows_in, 5);
        assert_eq!(table.rows_rejected, 1);
        assert_eq!(table.violation_count, 1);
        assert!(table.passed);
    }
}

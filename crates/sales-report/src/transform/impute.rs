//! Imputation and removal of missing numeric values.
//!
//! Each imputable field has a [`FieldPolicy`]. Group-based policies fall back
//! to the global statistic of the field when a row's group has no observed
//! value, and to removing the row when the field has no observed value at all.
//! Fill values are computed from observed values only, so the order in which
//! fields are processed does not matter.

use crate::schema::{
    COL_ENGINE_SIZE, COL_FUEL_TYPE, COL_MILEAGE, COL_MODEL, COL_PRICE, COL_REGION,
    COL_SALES_VOLUME, COL_TRANSMISSION, COL_YEAR, Observation, Record,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

/// Fields that may be missing after validation.
pub const IMPUTABLE_FIELDS: [&str; 4] = [COL_ENGINE_SIZE, COL_SALES_VOLUME, COL_PRICE, COL_MILEAGE];

/// Columns a group-based policy may group by.
const GROUP_DIMENSIONS: [&str; 5] = [COL_REGION, COL_MODEL, COL_YEAR, COL_FUEL_TYPE, COL_TRANSMISSION];

/// How one field's missing values are handled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum FieldPolicy {
    /// Mean of the row's group, falling back to the global mean.
    GroupMean { by: Vec<String> },
    /// Median of the row's group, falling back to the global median.
    GroupMedian { by: Vec<String> },
    /// Mean over all observed values.
    GlobalMean,
    /// A fixed value.
    Constant { value: f64 },
    /// Drop the row.
    Remove,
}

impl FieldPolicy {
    fn describe(&self) -> String {
        match self {
            Self::GroupMean { by } => format!("group mean by {}", by.join("+")),
            Self::GroupMedian { by } => format!("group median by {}", by.join("+")),
            Self::GlobalMean => "global mean".to_string(),
            Self::Constant { value } => format!("constant {}", value),
            Self::Remove => "row removal".to_string(),
        }
    }

    fn group_by(&self) -> Option<&[String]> {
        match self {
            Self::GroupMean { by } | Self::GroupMedian { by } => Some(by),
            _ => None,
        }
    }
}

/// Per-field imputation policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImputationPolicy {
    fields: BTreeMap<String, FieldPolicy>,
}

impl Default for ImputationPolicy {
    fn default() -> Self {
        let by = vec![COL_REGION.to_string(), COL_MODEL.to_string()];
        let fields = IMPUTABLE_FIELDS
            .iter()
            .map(|f| (f.to_string(), FieldPolicy::GroupMean { by: by.clone() }))
            .collect();
        Self { fields }
    }
}

impl ImputationPolicy {
    /// Policy for `field`; fields without an entry are removed when missing.
    pub fn policy(&self, field: &str) -> FieldPolicy {
        self.fields.get(field).cloned().unwrap_or(FieldPolicy::Remove)
    }

    /// Override the policy for one field.
    pub fn with_field(mut self, field: &str, policy: FieldPolicy) -> Self {
        self.fields.insert(field.to_string(), policy);
        self
    }

    /// Check field names and grouping dimensions.
    pub fn check(&self) -> Result<(), String> {
        for (field, policy) in &self.fields {
            if !IMPUTABLE_FIELDS.contains(&field.as_str()) {
                return Err(format!("'{}' is not an imputable field", field));
            }
            if let Some(by) = policy.group_by() {
                if by.is_empty() {
                    return Err(format!("group policy for '{}' has no grouping columns", field));
                }
                if let Some(bad) = by.iter().find(|d| !GROUP_DIMENSIONS.contains(&d.as_str())) {
                    return Err(format!("cannot group '{}' by '{}'", field, bad));
                }
            }
            if let FieldPolicy::Constant { value } = policy
                && (!value.is_finite() || *value < 0.0)
            {
                return Err(format!("constant for '{}' must be a non-negative number", field));
            }
        }
        Ok(())
    }
}

/// What happened to one field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldImputation {
    pub field: String,
    pub policy: String,
    /// Values filled by the configured policy.
    pub imputed: usize,
    /// Values filled by the global fallback of a group policy.
    pub fallback: usize,
    /// Rows removed because this field could not be filled.
    pub removed: usize,
}

/// Record of imputation for the context metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImputationSummary {
    /// Only fields that had missing values.
    pub fields: Vec<FieldImputation>,
    pub rows_removed: usize,
    /// Input row indices of records carrying at least one imputed value.
    pub approximate_rows: Vec<usize>,
}

impl ImputationSummary {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn total_imputed(&self) -> usize {
        self.fields.iter().map(|f| f.imputed + f.fallback).sum()
    }

    /// One human-readable line per affected field.
    pub fn notes(&self) -> Vec<String> {
        self.fields
            .iter()
            .map(|f| {
                let mut note = format!("{}: {} value(s) approximated by {}", f.field, f.imputed, f.policy);
                if f.fallback > 0 {
                    note.push_str(&format!(", {} by global fallback", f.fallback));
                }
                if f.removed > 0 {
                    note.push_str(&format!(", {} row(s) removed", f.removed));
                }
                note
            })
            .collect()
    }
}

fn field_value(obs: &Observation, field: &str) -> Option<f64> {
    match field {
        COL_ENGINE_SIZE => obs.engine_size_l,
        COL_SALES_VOLUME => obs.sales_volume.map(|v| v as f64),
        COL_PRICE => obs.price_usd,
        COL_MILEAGE => obs.mileage_km,
        _ => None,
    }
}

fn group_key(obs: &Observation, by: &[String]) -> Vec<String> {
    by.iter()
        .map(|d| match d.as_str() {
            COL_REGION => obs.region.to_string(),
            COL_MODEL => obs.model.clone(),
            COL_YEAR => obs.year.to_string(),
            COL_FUEL_TYPE => obs.fuel_type.to_string(),
            COL_TRANSMISSION => obs.transmission.to_string(),
            _ => String::new(),
        })
        .collect()
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// Fill values per observation index for one field; `None` marks removal.
fn fill_field(
    observations: &[Observation],
    field: &str,
    policy: &FieldPolicy,
    stats: &mut FieldImputation,
) -> HashMap<usize, Option<f64>> {
    let observed: Vec<f64> = observations.iter().filter_map(|o| field_value(o, field)).collect();
    let use_median = matches!(policy, FieldPolicy::GroupMedian { .. });
    let global = if use_median { median(&observed) } else { mean(&observed) };

    let groups: HashMap<Vec<String>, f64> = match policy.group_by() {
        Some(by) => {
            let mut buckets: HashMap<Vec<String>, Vec<f64>> = HashMap::new();
            for obs in observations {
                if let Some(v) = field_value(obs, field) {
                    buckets.entry(group_key(obs, by)).or_default().push(v);
                }
            }
            buckets
                .into_iter()
                .filter_map(|(k, vals)| {
                    let stat = if use_median { median(&vals) } else { mean(&vals) };
                    stat.map(|s| (k, s))
                })
                .collect()
        }
        None => HashMap::new(),
    };

    let mut fills = HashMap::new();
    for (idx, obs) in observations.iter().enumerate() {
        if field_value(obs, field).is_some() {
            continue;
        }
        let fill = match policy {
            FieldPolicy::GroupMean { by } | FieldPolicy::GroupMedian { by } => {
                match groups.get(&group_key(obs, by)) {
                    Some(v) => {
                        stats.imputed += 1;
                        Some(*v)
                    }
                    None => {
                        if global.is_some() {
                            stats.fallback += 1;
                        }
                        global
                    }
                }
            }
            FieldPolicy::GlobalMean => {
                if global.is_some() {
                    stats.imputed += 1;
                }
                global
            }
            FieldPolicy::Constant { value } => {
                stats.imputed += 1;
                Some(*value)
            }
            FieldPolicy::Remove => None,
        };
        if fill.is_none() {
            stats.removed += 1;
        }
        fills.insert(idx, fill);
    }
    fills
}

/// Apply `policy` to `observations`, producing complete records.
pub fn impute(observations: Vec<Observation>, policy: &ImputationPolicy) -> (Vec<Record>, ImputationSummary) {
    let mut summary = ImputationSummary::default();
    let mut fills: HashMap<&str, HashMap<usize, Option<f64>>> = HashMap::new();

    // mileage is an optional column: skip it when the input never carried it
    let has_mileage = observations.iter().any(|o| o.mileage_km.is_some());

    for field in IMPUTABLE_FIELDS {
        if field == COL_MILEAGE && !has_mileage {
            continue;
        }
        let field_policy = policy.policy(field);
        let mut stats = FieldImputation {
            field: field.to_string(),
            policy: field_policy.describe(),
            ..FieldImputation::default()
        };
        let field_fills = fill_field(&observations, field, &field_policy, &mut stats);
        if !field_fills.is_empty() {
            debug!(field, imputed = stats.imputed, fallback = stats.fallback, removed = stats.removed, "Imputed field");
            summary.fields.push(stats);
            fills.insert(field, field_fills);
        }
    }

    let fill_for = |field: &str, idx: usize| fills.get(field).and_then(|f| f.get(&idx)).copied();

    let mut records = Vec::with_capacity(observations.len());
    let mut approximate = HashSet::new();
    for (idx, obs) in observations.into_iter().enumerate() {
        let mut removed = false;
        let mut resolve = |field: &str, value: Option<f64>| -> Option<f64> {
            match value {
                Some(v) => Some(v),
                None => match fill_for(field, idx) {
                    Some(Some(v)) => {
                        approximate.insert(obs.row);
                        Some(v)
                    }
                    Some(None) => {
                        removed = true;
                        None
                    }
                    None => None,
                },
            }
        };

        let engine = resolve(COL_ENGINE_SIZE, obs.engine_size_l);
        let units = resolve(COL_SALES_VOLUME, obs.sales_volume.map(|v| v as f64));
        let price = resolve(COL_PRICE, obs.price_usd);
        let mileage = resolve(COL_MILEAGE, obs.mileage_km);

        let (Some(engine_size_l), Some(units), Some(price_usd), false) = (engine, units, price, removed) else {
            approximate.remove(&obs.row);
            summary.rows_removed += 1;
            continue;
        };

        records.push(Record {
            region: obs.region,
            model: obs.model,
            year: obs.year,
            fuel_type: obs.fuel_type,
            transmission: obs.transmission,
            engine_size_l,
            sales_volume: units.round() as u64,
            price_usd,
            color: obs.color,
            mileage_km: mileage,
        });
    }

    let mut approximate_rows: Vec<usize> = approximate.into_iter().collect();
    approximate_rows.sort_unstable();
    summary.approximate_rows = approximate_rows;

    if !summary.is_empty() {
        info!(
            imputed = summary.total_imputed(),
            rows_removed = summary.rows_removed,
            "Imputation complete"
        );
    }
    (records, summary)
}

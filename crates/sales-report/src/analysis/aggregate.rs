//! Aggregations over a [`Dataset`].
//!
//! The transformer and the visualizer both go through [`Analyzer`], so any
//! number that appears in the narrative context and in a chart (yearly totals,
//! group sums, group means) comes from the same function.

use crate::analysis::BinSpec;
use crate::dataset::Dataset;
use crate::schema::Record;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// A categorical axis records can be grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Year,
    Region,
    Model,
    FuelType,
    Transmission,
    EngineBin,
    Color,
    MileageBin,
}

impl Dimension {
    /// Resolve a column-style name (`"fuel_type"`, `"engine_size"`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "year" => Some(Self::Year),
            "region" => Some(Self::Region),
            "model" => Some(Self::Model),
            "fuel_type" | "fuel" => Some(Self::FuelType),
            "transmission" => Some(Self::Transmission),
            "engine_bin" | "engine_size" | "engine_size_l" => Some(Self::EngineBin),
            "color" | "colour" => Some(Self::Color),
            "mileage_bin" | "mileage" | "mileage_km" => Some(Self::MileageBin),
            _ => None,
        }
    }

    /// Human-readable axis label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Year => "Year",
            Self::Region => "Region",
            Self::Model => "Model",
            Self::FuelType => "Fuel Type",
            Self::Transmission => "Transmission",
            Self::EngineBin => "Engine Size (L)",
            Self::Color => "Color",
            Self::MileageBin => "Mileage (km)",
        }
    }
}

/// A numeric quantity aggregated per group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    Units,
    Revenue,
    Price,
    EngineSize,
    Mileage,
}

impl Measure {
    /// Resolve a column-style name (`"sales_volume"`, `"price_usd"`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "units" | "sales_volume" => Some(Self::Units),
            "revenue" => Some(Self::Revenue),
            "price" | "price_usd" => Some(Self::Price),
            "engine_size" | "engine_size_l" => Some(Self::EngineSize),
            "mileage" | "mileage_km" => Some(Self::Mileage),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Units => "Sales Volume (Units)",
            Self::Revenue => "Revenue (USD)",
            Self::Price => "Price (USD)",
            Self::EngineSize => "Engine Size (L)",
            Self::Mileage => "Mileage (km)",
        }
    }

    /// Value of this measure for one record, if the record carries it.
    pub fn value(&self, record: &Record) -> Option<f64> {
        match self {
            Self::Units => Some(record.sales_volume as f64),
            Self::Revenue => Some(record.revenue()),
            Self::Price => Some(record.price_usd),
            Self::EngineSize => Some(record.engine_size_l),
            Self::Mileage => record.mileage_km,
        }
    }
}

/// Descriptive statistics of a set of values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub q1: f64,
    pub q3: f64,
}

impl Stats {
    /// Statistics of `values`; `None` when empty. Quantiles interpolate linearly.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let sum: f64 = sorted.iter().sum();
        Some(Self {
            count: sorted.len(),
            sum,
            mean: sum / sorted.len() as f64,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            median: quantile(&sorted, 0.5),
            q1: quantile(&sorted, 0.25),
            q3: quantile(&sorted, 0.75),
        })
    }
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// One group of an aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// Key per grouping dimension, in the order requested.
    pub keys: Vec<String>,
    /// Raw values of the measure, in record order.
    pub values: Vec<f64>,
    /// Units sold by the group (always tracked for rankings).
    pub units: u64,
}

impl Group {
    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            0.0
        } else {
            self.sum() / self.values.len() as f64
        }
    }

    pub fn stats(&self) -> Option<Stats> {
        Stats::from_values(&self.values)
    }
}

/// Aggregation entry point bound to one dataset and its bin definitions.
#[derive(Debug, Clone, Copy)]
pub struct Analyzer<'a> {
    dataset: &'a Dataset,
    engine_bins: &'a BinSpec,
    mileage_bins: &'a BinSpec,
}

impl<'a> Analyzer<'a> {
    pub fn new(dataset: &'a Dataset, engine_bins: &'a BinSpec, mileage_bins: &'a BinSpec) -> Self {
        Self {
            dataset,
            engine_bins,
            mileage_bins,
        }
    }

    pub fn dataset(&self) -> &'a Dataset {
        self.dataset
    }

    /// Whether the dataset carries data for `dimension` at all.
    pub fn supports(&self, dimension: Dimension) -> bool {
        match dimension {
            Dimension::Color => self.dataset.has_color(),
            Dimension::MileageBin => self.dataset.has_mileage(),
            _ => true,
        }
    }

    /// Group key of `record` along `dimension`; `None` when the record has no
    /// value there (missing color, mileage outside the bins).
    pub fn key(&self, record: &Record, dimension: Dimension) -> Option<String> {
        match dimension {
            Dimension::Year => Some(record.year.to_string()),
            Dimension::Region => Some(record.region.to_string()),
            Dimension::Model => Some(record.model.clone()),
            Dimension::FuelType => Some(record.fuel_type.to_string()),
            Dimension::Transmission => Some(record.transmission.to_string()),
            Dimension::EngineBin => self.engine_bins.assign(record.engine_size_l).map(str::to_string),
            Dimension::Color => record.color.clone(),
            Dimension::MileageBin => record
                .mileage_km
                .and_then(|m| self.mileage_bins.assign(m))
                .map(str::to_string),
        }
    }

    /// Position of `key` in the natural order of `dimension`.
    ///
    /// Years sort numerically, bins in bin order, enums in declaration order
    /// and free-text keys alphabetically.
    pub fn compare_keys(&self, dimension: Dimension, a: &str, b: &str) -> Ordering {
        let rank = |spec: &BinSpec, key: &str| spec.labels().iter().position(|l| *l == key);
        match dimension {
            Dimension::Year => a
                .parse::<i32>()
                .ok()
                .cmp(&b.parse::<i32>().ok())
                .then_with(|| a.cmp(b)),
            Dimension::EngineBin => rank(self.engine_bins, a).cmp(&rank(self.engine_bins, b)),
            Dimension::MileageBin => rank(self.mileage_bins, a).cmp(&rank(self.mileage_bins, b)),
            Dimension::Region => enum_rank::<crate::schema::Region>(a).cmp(&enum_rank::<crate::schema::Region>(b)),
            Dimension::FuelType => enum_rank::<crate::schema::FuelType>(a).cmp(&enum_rank::<crate::schema::FuelType>(b)),
            Dimension::Transmission => {
                enum_rank::<crate::schema::Transmission>(a).cmp(&enum_rank::<crate::schema::Transmission>(b))
            }
            Dimension::Model | Dimension::Color => a.cmp(b),
        }
    }

    /// Group records by `dimensions` and collect `measure`, in first-seen order.
    ///
    /// Records without a key on any requested dimension, or without a value
    /// for `measure`, are left out.
    pub fn group(&self, dimensions: &[Dimension], measure: Measure) -> Vec<Group> {
        let mut index: HashMap<Vec<String>, usize> = HashMap::new();
        let mut groups: Vec<Group> = Vec::new();

        for record in self.dataset.records() {
            let Some(keys) = dimensions
                .iter()
                .map(|d| self.key(record, *d))
                .collect::<Option<Vec<String>>>()
            else {
                continue;
            };
            let Some(value) = measure.value(record) else {
                continue;
            };

            let slot = *index.entry(keys.clone()).or_insert_with(|| {
                groups.push(Group {
                    keys,
                    values: Vec::new(),
                    units: 0,
                });
                groups.len() - 1
            });
            groups[slot].values.push(value);
            groups[slot].units = groups[slot].units.saturating_add(record.sales_volume);
        }

        groups
    }

    /// Units sold per year, ascending by year.
    pub fn yearly_totals(&self) -> Vec<(i32, u64)> {
        let mut totals: Vec<(i32, u64)> = self
            .group(&[Dimension::Year], Measure::Units)
            .into_iter()
            .filter_map(|g| g.keys[0].parse::<i32>().ok().map(|y| (y, g.units)))
            .collect();
        totals.sort_by_key(|(year, _)| *year);
        totals
    }

    /// Units sold per year for records whose `dimension` equals `key`.
    pub fn yearly_units_for(&self, dimension: Dimension, key: &str) -> Vec<(i32, u64)> {
        let mut series: Vec<(i32, u64)> = self
            .group(&[dimension, Dimension::Year], Measure::Units)
            .into_iter()
            .filter(|g| g.keys[0] == key)
            .filter_map(|g| g.keys[1].parse::<i32>().ok().map(|y| (y, g.units)))
            .collect();
        series.sort_by_key(|(year, _)| *year);
        series
    }

    /// Mean price per year for records whose `dimension` equals `key`.
    pub fn yearly_price_for(&self, dimension: Dimension, key: &str) -> Vec<(i32, f64)> {
        let mut series: Vec<(i32, f64)> = self
            .group(&[dimension, Dimension::Year], Measure::Price)
            .into_iter()
            .filter(|g| g.keys[0] == key)
            .filter_map(|g| g.keys[1].parse::<i32>().ok().map(|y| (y, g.mean())))
            .collect();
        series.sort_by_key(|(year, _)| *year);
        series
    }

    /// Units per key of `dimension`, largest first.
    ///
    /// Ties are broken by key ascending, then by first-seen order.
    pub fn ranked_by_units(&self, dimension: Dimension) -> Vec<(String, u64)> {
        let mut ranked: Vec<(String, u64)> = self
            .group(&[dimension], Measure::Units)
            .into_iter()
            .map(|g| (g.keys.into_iter().next().unwrap_or_default(), g.units))
            .collect();
        // stable sort keeps first-seen order for full ties
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }

    /// Top `n` keys of `dimension` by units sold.
    pub fn top_n(&self, dimension: Dimension, n: usize) -> Vec<(String, u64)> {
        let mut ranked = self.ranked_by_units(dimension);
        ranked.truncate(n);
        ranked
    }

    /// Top `n` keys of `dimension` by average selling price.
    pub fn price_leaders(&self, dimension: Dimension, n: usize) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self
            .group(&[dimension], Measure::Price)
            .into_iter()
            .map(|g| {
                let mean = g.mean();
                (g.keys.into_iter().next().unwrap_or_default(), mean)
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(n);
        ranked
    }

    /// Statistics of `measure` over the whole dataset.
    pub fn stats(&self, measure: Measure) -> Option<Stats> {
        let values: Vec<f64> = self
            .dataset
            .records()
            .iter()
            .filter_map(|r| measure.value(r))
            .collect();
        Stats::from_values(&values)
    }

    /// Pearson correlation between two measures across records carrying both.
    pub fn correlation(&self, x: Measure, y: Measure) -> Option<f64> {
        let pairs: Vec<(f64, f64)> = self
            .dataset
            .records()
            .iter()
            .filter_map(|r| Some((x.value(r)?, y.value(r)?)))
            .collect();
        pearson(&pairs)
    }

    /// Total units and total revenue.
    pub fn totals(&self) -> (u64, f64) {
        self.dataset
            .records()
            .iter()
            .fold((0u64, 0.0), |(units, revenue), r| {
                (units.saturating_add(r.sales_volume), revenue + r.revenue())
            })
    }
}

fn enum_rank<T>(key: &str) -> Option<usize>
where
    T: std::str::FromStr + PartialEq + EnumOrder,
{
    key.parse::<T>().ok().and_then(|v| v.position())
}

/// Declaration-order position for the schema enums.
trait EnumOrder: Sized {
    fn position(&self) -> Option<usize>;
}

macro_rules! enum_order {
    ($($ty:ty),+) => {
        $(impl EnumOrder for $ty {
            fn position(&self) -> Option<usize> {
                <$ty>::ALL.iter().position(|v| v == self)
            }
        })+
    };
}

enum_order!(
    crate::schema::Region,
    crate::schema::FuelType,
    crate::schema::Transmission
);

fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in pairs {
        cov += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x).powi(2);
        var_y += (y - mean_y).powi(2);
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

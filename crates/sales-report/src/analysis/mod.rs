//! Shared aggregation, binning and growth analytics.
//!
//! - [`binning`] - Labeled interval bins for continuous fields
//! - [`aggregate`] - Grouping, rankings, statistics and correlations
//! - [`growth`] - Pluggable growth-rate metrics

pub mod aggregate;
pub mod binning;
pub mod growth;

pub use aggregate::{Analyzer, Dimension, Group, Measure, Stats};
pub use binning::{Bin, BinSpec};
pub use growth::{Cagr, GrowthMethod, GrowthMetric, PeriodChange, trend_label};

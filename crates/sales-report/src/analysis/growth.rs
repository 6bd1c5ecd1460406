//! Pluggable growth-rate metrics.
//!
//! Regional and overall growth can be reported either as a compound annual
//! rate or as the plain change between the first and last year. The choice is
//! configuration; custom metrics implement [`GrowthMetric`].

use serde::{Deserialize, Serialize};

/// Computes a growth rate from a yearly series.
pub trait GrowthMetric: Send + Sync {
    /// Short label used in rendered text (e.g. "CAGR").
    fn label(&self) -> &str;

    /// Growth as a fraction (0.05 = +5%) for a series sorted by year.
    ///
    /// Returns `None` when the series has fewer than two years or starts at
    /// a non-positive value.
    fn growth(&self, series: &[(i32, f64)]) -> Option<f64>;
}

/// Compound annual growth rate between the first and last year.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cagr;

impl GrowthMetric for Cagr {
    fn label(&self) -> &str {
        "CAGR"
    }

    fn growth(&self, series: &[(i32, f64)]) -> Option<f64> {
        let (first_year, start) = *series.first()?;
        let (last_year, end) = *series.last()?;
        let periods = last_year - first_year;
        if periods <= 0 || start <= 0.0 {
            return None;
        }
        Some((end / start).powf(1.0 / periods as f64) - 1.0)
    }
}

/// Total change between the first and last year.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeriodChange;

impl GrowthMetric for PeriodChange {
    fn label(&self) -> &str {
        "Growth"
    }

    fn growth(&self, series: &[(i32, f64)]) -> Option<f64> {
        if series.len() < 2 {
            return None;
        }
        let (_, start) = *series.first()?;
        let (_, end) = *series.last()?;
        if start <= 0.0 {
            return None;
        }
        Some(end / start - 1.0)
    }
}

/// Built-in growth metrics selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GrowthMethod {
    #[default]
    Cagr,
    PeriodChange,
}

impl GrowthMethod {
    /// The metric implementation for this method.
    pub fn metric(&self) -> Box<dyn GrowthMetric> {
        match self {
            Self::Cagr => Box::new(Cagr),
            Self::PeriodChange => Box::new(PeriodChange),
        }
    }
}

/// Direction of a growth rate using a ±5% dead band.
pub fn trend_label(growth: Option<f64>) -> &'static str {
    match growth {
        Some(g) if g > 0.05 => "increasing",
        Some(g) if g < -0.05 => "decreasing",
        _ => "stable",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_cagr_two_periods() {
        let series = [(2020, 100.0), (2021, 110.0), (2022, 121.0)];
        assert!(approx(Cagr.growth(&series).unwrap(), 0.10));
    }

    #[test]
    fn test_cagr_uses_year_span_not_point_count() {
        // missing 2021 still spans two years
        let series = [(2020, 100.0), (2022, 121.0)];
        assert!(approx(Cagr.growth(&series).unwrap(), 0.10));
    }

    #[test]
    fn test_period_change() {
        let series = [(2020, 200.0), (2021, 150.0), (2024, 300.0)];
        assert!(approx(PeriodChange.growth(&series).unwrap(), 0.5));
    }

    #[test]
    fn test_growth_undefined_cases() {
        assert_eq!(Cagr.growth(&[(2020, 100.0)]), None);
        assert_eq!(Cagr.growth(&[(2020, 0.0), (2021, 10.0)]), None);
        assert_eq!(PeriodChange.growth(&[]), None);
    }

    #[test]
    fn test_trend_label() {
        assert_eq!(trend_label(Some(0.2)), "increasing");
        assert_eq!(trend_label(Some(-0.06)), "decreasing");
        assert_eq!(trend_label(Some(0.01)), "stable");
        assert_eq!(trend_label(None), "stable");
    }

    #[test]
    fn test_method_dispatch() {
        assert_eq!(GrowthMethod::Cagr.metric().label(), "CAGR");
        assert_eq!(GrowthMethod::PeriodChange.metric().label(), "Growth");
    }
}

//! Context sections built from the shared aggregations.
//!
//! Priorities decide what survives a tight budget: the global summary and the
//! yearly table outlive rankings, which outlive segment detail, temporal
//! breakdowns and, last, correlations.

use crate::analysis::{Analyzer, Dimension, GrowthMetric, Measure, trend_label};
use crate::transform::context::ContextSection;
use std::fmt::Write;

pub const SECTION_OVERVIEW: &str = "overview";
pub const SECTION_YEARLY: &str = "yearly-totals";
pub const SECTION_REGIONAL: &str = "regional-totals";
pub const SECTION_TOP: &str = "top-performers";
pub const SECTION_PRICE_LEADERS: &str = "price-leaders";
pub const SECTION_REGIONAL_PROFILE: &str = "regional-profile";
pub const SECTION_SEGMENTS: &str = "segment-summary";
pub const SECTION_TEMPORAL: &str = "temporal-trends";
pub const SECTION_CORRELATIONS: &str = "correlations";

/// Integer with thousands separators.
pub fn fmt_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Whole dollars with thousands separators.
pub fn fmt_money(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{}${}", sign, fmt_count(value.abs().round() as u64))
}

/// Signed percentage with two decimals, or "n/a".
pub fn fmt_growth(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:+.2}%", v * 100.0),
        None => "n/a".to_string(),
    }
}

fn units_series(series: &[(i32, u64)]) -> Vec<(i32, f64)> {
    series.iter().map(|(y, u)| (*y, *u as f64)).collect()
}

/// Builds every context section for one dataset.
pub struct SectionBuilder<'a> {
    analyzer: Analyzer<'a>,
    metric: &'a dyn GrowthMetric,
    top_n: usize,
}

impl<'a> SectionBuilder<'a> {
    pub fn new(analyzer: Analyzer<'a>, metric: &'a dyn GrowthMetric, top_n: usize) -> Self {
        Self {
            analyzer,
            metric,
            top_n,
        }
    }

    /// All sections in document order.
    pub fn build(&self) -> Vec<ContextSection> {
        let mut sections = vec![self.overview(), self.yearly_totals(), self.regional_totals()];
        sections.push(self.top_performers());
        sections.push(self.price_leaders());
        sections.push(self.regional_profile());
        sections.push(self.segment_summary());
        sections.push(self.temporal_trends());
        if let Some(correlations) = self.correlations() {
            sections.push(correlations);
        }
        sections
    }

    fn overview(&self) -> ContextSection {
        let (units, revenue) = self.analyzer.totals();
        let yearly = self.analyzer.yearly_totals();
        let growth = self.metric.growth(&units_series(&yearly));

        let mut body = String::new();
        let _ = writeln!(body, "- Total revenue: {}", fmt_money(revenue));
        let _ = writeln!(body, "- Total sales volume: {} units", fmt_count(units));
        let _ = writeln!(
            body,
            "- Overall sales trend: {} ({}: {})",
            trend_label(growth).to_uppercase(),
            self.metric.label(),
            fmt_growth(growth)
        );
        if let Some(stats) = self.analyzer.stats(Measure::Price) {
            let _ = writeln!(
                body,
                "- Price: mean {}, median {}, range {} - {}, IQR {} - {}",
                fmt_money(stats.mean),
                fmt_money(stats.median),
                fmt_money(stats.min),
                fmt_money(stats.max),
                fmt_money(stats.q1),
                fmt_money(stats.q3)
            );
        }
        if let Some(stats) = self.analyzer.stats(Measure::EngineSize) {
            let _ = writeln!(
                body,
                "- Engine size: mean {:.2}L, median {:.2}L",
                stats.mean, stats.median
            );
        }
        if self.analyzer.dataset().has_mileage()
            && let Some(stats) = self.analyzer.stats(Measure::Mileage)
        {
            let _ = writeln!(
                body,
                "- Mileage: mean {}km, median {}km, max {}km",
                fmt_count(stats.mean.round() as u64),
                fmt_count(stats.median.round() as u64),
                fmt_count(stats.max.round() as u64)
            );
        }
        ContextSection::new(SECTION_OVERVIEW, "Global Performance Summary", 100, body)
    }

    fn yearly_totals(&self) -> ContextSection {
        let mut revenue_by_year = self.analyzer.group(&[Dimension::Year], Measure::Revenue);
        revenue_by_year.sort_by(|a, b| self.analyzer.compare_keys(Dimension::Year, &a.keys[0], &b.keys[0]));

        let mut body = String::from("| Year | Units | Revenue | YoY Units |\n|---|---:|---:|---:|\n");
        let mut previous: Option<u64> = None;
        for group in &revenue_by_year {
            let yoy = previous
                .filter(|p| *p > 0)
                .map(|p| group.units as f64 / p as f64 - 1.0);
            let _ = writeln!(
                body,
                "| {} | {} | {} | {} |",
                group.keys[0],
                fmt_count(group.units),
                fmt_money(group.sum()),
                fmt_growth(yoy)
            );
            previous = Some(group.units);
        }
        ContextSection::new(SECTION_YEARLY, "Yearly Totals", 95, body)
    }

    fn regional_totals(&self) -> ContextSection {
        let (total_units, _) = self.analyzer.totals();
        let ranked = self.analyzer.ranked_by_units(Dimension::Region);

        let mut body = format!(
            "| Region | Units | Share | {} | Trend |\n|---|---:|---:|---:|---|\n",
            self.metric.label()
        );
        for (region, units) in ranked {
            let series = units_series(&self.analyzer.yearly_units_for(Dimension::Region, &region));
            let growth = self.metric.growth(&series);
            let share = if total_units > 0 {
                units as f64 / total_units as f64 * 100.0
            } else {
                0.0
            };
            let _ = writeln!(
                body,
                "| {} | {} | {:.1}% | {} | {} |",
                region,
                fmt_count(units),
                share,
                fmt_growth(growth),
                trend_label(growth)
            );
        }
        ContextSection::new(SECTION_REGIONAL, "Regional Totals", 90, body)
    }

    fn ranking_line(&self, label: &str, dimension: Dimension, suffix: &str) -> Option<String> {
        if !self.analyzer.supports(dimension) {
            return None;
        }
        let top = self.analyzer.top_n(dimension, self.top_n);
        if top.is_empty() {
            return None;
        }
        let entries: Vec<String> = top
            .iter()
            .map(|(k, u)| format!("{}{} ({})", k, suffix, fmt_count(*u)))
            .collect();
        Some(format!("- Top {} {}: {}", self.top_n, label, entries.join(", ")))
    }

    fn top_performers(&self) -> ContextSection {
        let lines = [
            self.ranking_line("models", Dimension::Model, ""),
            self.ranking_line("regions", Dimension::Region, ""),
            self.ranking_line("engine sizes", Dimension::EngineBin, "L"),
            self.ranking_line("fuel types", Dimension::FuelType, ""),
            self.ranking_line("colors", Dimension::Color, ""),
        ];
        let body = lines.into_iter().flatten().collect::<Vec<_>>().join("\n");
        ContextSection::new(SECTION_TOP, "Top Performers by Sales Volume", 85, body)
    }

    fn price_leaders(&self) -> ContextSection {
        let mut body = String::from("| Model | Avg Price |\n|---|---:|\n");
        for (model, price) in self.analyzer.price_leaders(Dimension::Model, self.top_n) {
            let _ = writeln!(body, "| {} | {} |", model, fmt_money(price));
        }
        ContextSection::new(SECTION_PRICE_LEADERS, "Average Selling Price Leaders", 80, body)
    }

    fn regional_profile(&self) -> ContextSection {
        let has_mileage = self.analyzer.dataset().has_mileage();
        let prices = self.analyzer.group(&[Dimension::Region], Measure::Price);
        let mileage = self.analyzer.group(&[Dimension::Region], Measure::Mileage);

        let mut body = String::new();
        for (region, units) in self.analyzer.ranked_by_units(Dimension::Region) {
            let favourite = |dimension: Dimension| {
                self.analyzer
                    .group(&[Dimension::Region, dimension], Measure::Units)
                    .into_iter()
                    .filter(|g| g.keys[0] == region)
                    .max_by(|a, b| a.units.cmp(&b.units).then_with(|| b.keys[1].cmp(&a.keys[1])))
                    .map(|g| g.keys[1].clone())
                    .unwrap_or_else(|| "n/a".to_string())
            };
            let avg_price = prices
                .iter()
                .find(|g| g.keys[0] == region)
                .map(|g| fmt_money(g.mean()))
                .unwrap_or_else(|| "n/a".to_string());

            let _ = write!(
                body,
                "- {}: {} units, avg price {}, top model {}, preferred fuel {}, preferred transmission {}",
                region,
                fmt_count(units),
                avg_price,
                favourite(Dimension::Model),
                favourite(Dimension::FuelType),
                favourite(Dimension::Transmission)
            );
            if has_mileage && let Some(g) = mileage.iter().find(|g| g.keys[0] == region) {
                let _ = write!(body, ", avg mileage {}km", fmt_count(g.mean().round() as u64));
            }
            body.push('\n');
        }
        ContextSection::new(SECTION_REGIONAL_PROFILE, "Regional Demand and Pricing Profile", 60, body)
    }

    fn segment_table(&self, dimension: Dimension) -> Option<String> {
        if !self.analyzer.supports(dimension) {
            return None;
        }
        let mut groups = self.analyzer.group(&[dimension], Measure::Price);
        if groups.is_empty() {
            return None;
        }
        groups.sort_by(|a, b| self.analyzer.compare_keys(dimension, &a.keys[0], &b.keys[0]));

        let mut table = format!(
            "### {}\n\n| Segment | Units | Avg Price | Median Price | Range |\n|---|---:|---:|---:|---|\n",
            dimension.label()
        );
        for group in groups {
            let Some(stats) = group.stats() else { continue };
            let _ = writeln!(
                table,
                "| {} | {} | {} | {} | {} - {} |",
                group.keys[0],
                fmt_count(group.units),
                fmt_money(stats.mean),
                fmt_money(stats.median),
                fmt_money(stats.min),
                fmt_money(stats.max)
            );
        }
        Some(table)
    }

    fn segment_summary(&self) -> ContextSection {
        let tables: Vec<String> = [
            Dimension::Transmission,
            Dimension::FuelType,
            Dimension::EngineBin,
            Dimension::MileageBin,
        ]
        .into_iter()
        .filter_map(|d| self.segment_table(d))
        .collect();
        ContextSection::new(SECTION_SEGMENTS, "Segment Price Summary", 50, tables.join("\n"))
    }

    fn trend_lines(&self, dimension: Dimension, n: usize) -> Vec<String> {
        self.analyzer
            .top_n(dimension, n)
            .into_iter()
            .filter_map(|(key, _)| {
                let units = self.analyzer.yearly_units_for(dimension, &key);
                let prices = self.analyzer.yearly_price_for(dimension, &key);
                if units.is_empty() {
                    return None;
                }
                let breakdown: Vec<String> = units
                    .iter()
                    .map(|(year, u)| {
                        let price = prices
                            .iter()
                            .find(|(y, _)| y == year)
                            .map(|(_, p)| fmt_money(*p))
                            .unwrap_or_else(|| "n/a".to_string());
                        format!("{}: {} units / {}", year, fmt_count(*u), price)
                    })
                    .collect();
                let growth = self.metric.growth(&units_series(&units));
                Some(format!(
                    "- {} ({} {}, {}): {}",
                    key,
                    self.metric.label(),
                    fmt_growth(growth),
                    trend_label(growth),
                    breakdown.join(" | ")
                ))
            })
            .collect()
    }

    fn temporal_trends(&self) -> ContextSection {
        let mut body = String::new();
        let groups = [
            ("Models", Dimension::Model, self.top_n),
            ("Fuel types", Dimension::FuelType, 4),
            ("Transmissions", Dimension::Transmission, 2),
            ("Engine sizes", Dimension::EngineBin, self.top_n),
        ];
        for (label, dimension, n) in groups {
            let lines = self.trend_lines(dimension, n);
            if lines.is_empty() {
                continue;
            }
            let _ = writeln!(body, "### {}\n", label);
            for line in lines {
                let _ = writeln!(body, "{}", line);
            }
            body.push('\n');
        }
        ContextSection::new(SECTION_TEMPORAL, "Temporal Trends", 40, body)
    }

    fn correlations(&self) -> Option<ContextSection> {
        let mut lines = Vec::new();
        if let Some(r) = self.analyzer.correlation(Measure::Price, Measure::Units) {
            lines.push(format!(
                "- Price vs. sales volume: {} correlation ({:.2})",
                describe_price_sales(r),
                r
            ));
        }
        if self.analyzer.dataset().has_mileage()
            && let Some(r) = self.analyzer.correlation(Measure::Mileage, Measure::Price)
        {
            lines.push(format!(
                "- Mileage vs. price: {} correlation ({:.2})",
                describe_mileage_price(r),
                r
            ));
        }
        if lines.is_empty() {
            return None;
        }
        Some(ContextSection::new(
            SECTION_CORRELATIONS,
            "Correlation Insights",
            10,
            lines.join("\n"),
        ))
    }
}

/// Strength label for the price/sales correlation.
pub fn describe_price_sales(r: f64) -> &'static str {
    if r < -0.4 {
        "negative"
    } else if r > 0.4 {
        "positive"
    } else {
        "neutral"
    }
}

/// Strength label for the mileage/price correlation.
pub fn describe_mileage_price(r: f64) -> &'static str {
    if r < -0.6 {
        "strong negative"
    } else if r < -0.2 {
        "negative"
    } else {
        "neutral"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{BinSpec, Cagr};
    use crate::testing::sample_dataset;

    #[test]
    fn test_fmt_helpers() {
        assert_eq!(fmt_count(0), "0");
        assert_eq!(fmt_count(999), "999");
        assert_eq!(fmt_count(1_234_567), "1,234,567");
        assert_eq!(fmt_money(45_000.4), "$45,000");
        assert_eq!(fmt_growth(Some(0.1234)), "+12.34%");
        assert_eq!(fmt_growth(None), "n/a");
    }

    #[test]
    fn test_sections_in_document_order() {
        let dataset = sample_dataset();
        let (engine, mileage) = (BinSpec::engine_size(), BinSpec::mileage());
        let analyzer = Analyzer::new(&dataset, &engine, &mileage);
        let sections = SectionBuilder::new(analyzer, &Cagr, 3).build();
        let ids: Vec<&str> = sections.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                SECTION_OVERVIEW,
                SECTION_YEARLY,
                SECTION_REGIONAL,
                SECTION_TOP,
                SECTION_PRICE_LEADERS,
                SECTION_REGIONAL_PROFILE,
                SECTION_SEGMENTS,
                SECTION_TEMPORAL,
                SECTION_CORRELATIONS,
            ]
        );
        let correlations = sections.last().unwrap();
        assert!(sections.iter().all(|s| s.priority >= correlations.priority));
    }

    #[test]
    fn test_yearly_table_matches_analyzer_totals() {
        let dataset = sample_dataset();
        let (engine, mileage) = (BinSpec::engine_size(), BinSpec::mileage());
        let analyzer = Analyzer::new(&dataset, &engine, &mileage);
        let sections = SectionBuilder::new(analyzer, &Cagr, 3).build();
        let yearly = sections.iter().find(|s| s.id == SECTION_YEARLY).unwrap();
        for (year, units) in analyzer.yearly_totals() {
            assert!(yearly.body.contains(&format!("| {} | {} |", year, fmt_count(units))));
        }
    }

    #[test]
    fn test_top_performers_lists_top_models() {
        let dataset = sample_dataset();
        let (engine, mileage) = (BinSpec::engine_size(), BinSpec::mileage());
        let analyzer = Analyzer::new(&dataset, &engine, &mileage);
        let top = SectionBuilder::new(analyzer, &Cagr, 2).top_performers();
        // 3 Series 410, X3 400, i3 350, M5 97
        assert!(top.body.contains("- Top 2 models: 3 Series (410), X3 (400)"));
        assert!(!top.body.contains("colors"));
    }

    #[test]
    fn test_correlation_labels() {
        assert_eq!(describe_price_sales(-0.5), "negative");
        assert_eq!(describe_price_sales(0.1), "neutral");
        assert_eq!(describe_mileage_price(-0.7), "strong negative");
        assert_eq!(describe_mileage_price(-0.3), "negative");
    }
}

//! Labeled bins for continuous fields.
//!
//! Bins are half-open `[low, high)` except the last one, which is closed so
//! the maximum edge is captured. An open first or last edge (`None`) extends
//! the bin to infinity, which makes the partition total over the reals.

use serde::{Deserialize, Serialize};

/// One labeled interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    pub label: String,
    /// Inclusive lower edge; `None` means unbounded below.
    pub low: Option<f64>,
    /// Exclusive upper edge (inclusive for the last bin); `None` means unbounded above.
    pub high: Option<f64>,
}

/// An ordered, contiguous list of bins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BinSpec {
    bins: Vec<Bin>,
}

impl BinSpec {
    /// Bins covering the whole real line.
    ///
    /// `labels` must have exactly one more entry than `edges`: the first bin is
    /// `(-inf, edges[0])` and the last `[edges[n-1], +inf)`.
    pub fn open_ended(edges: &[f64], labels: &[&str]) -> Result<Self, String> {
        if labels.len() != edges.len() + 1 {
            return Err(format!(
                "{} edges need {} labels, got {}",
                edges.len(),
                edges.len() + 1,
                labels.len()
            ));
        }
        let spec = Self {
            bins: build_bins(edges, labels, true),
        };
        spec.check()?;
        Ok(spec)
    }

    /// Bins covering `[edges[0], edges[n-1]]`; values outside are unbinned.
    pub fn bounded(edges: &[f64], labels: &[&str]) -> Result<Self, String> {
        if edges.len() < 2 || labels.len() != edges.len() - 1 {
            return Err(format!(
                "{} edges need {} labels, got {}",
                edges.len(),
                edges.len().saturating_sub(1),
                labels.len()
            ));
        }
        let spec = Self {
            bins: build_bins(edges, labels, false),
        };
        spec.check()?;
        Ok(spec)
    }

    /// Default engine-size bins in liters.
    pub fn engine_size() -> Self {
        Self {
            bins: build_bins(
                &[2.0, 3.0, 4.0],
                &["<2.0", "2.0–3.0", "3.0–4.0", "4.0+"],
                true,
            ),
        }
    }

    /// Default mileage bins in kilometers.
    pub fn mileage() -> Self {
        Self {
            bins: build_bins(
                &[0.0, 50_000.0, 100_000.0, 150_000.0, 200_000.0],
                &["0–50k", "50k–100k", "100k–150k", "150k–200k"],
                false,
            ),
        }
    }

    /// The bins in order.
    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    /// Labels in bin order.
    pub fn labels(&self) -> Vec<&str> {
        self.bins.iter().map(|b| b.label.as_str()).collect()
    }

    /// Label of the bin containing `value`, or `None` if it falls outside a
    /// bounded spec (or is NaN).
    pub fn assign(&self, value: f64) -> Option<&str> {
        if value.is_nan() {
            return None;
        }
        let last = self.bins.len().saturating_sub(1);
        self.bins
            .iter()
            .enumerate()
            .find(|(i, bin)| {
                let above_low = bin.low.is_none_or(|low| value >= low);
                let below_high = match bin.high {
                    None => true,
                    Some(high) if *i == last => value <= high,
                    Some(high) => value < high,
                };
                above_low && below_high
            })
            .map(|(_, bin)| bin.label.as_str())
    }

    /// Check that bins are non-empty, uniquely labeled, increasing and contiguous.
    pub fn check(&self) -> Result<(), String> {
        if self.bins.is_empty() {
            return Err("at least one bin is required".to_string());
        }

        let last = self.bins.len() - 1;
        for (i, bin) in self.bins.iter().enumerate() {
            if bin.label.trim().is_empty() {
                return Err(format!("bin {} has an empty label", i));
            }
            if self.bins[..i].iter().any(|b| b.label == bin.label) {
                return Err(format!("duplicate bin label '{}'", bin.label));
            }
            if bin.low.is_none() && i != 0 {
                return Err(format!("only the first bin may be unbounded below ('{}')", bin.label));
            }
            if bin.high.is_none() && i != last {
                return Err(format!("only the last bin may be unbounded above ('{}')", bin.label));
            }
            if let (Some(low), Some(high)) = (bin.low, bin.high)
                && low >= high
            {
                return Err(format!("bin '{}' has low {} >= high {}", bin.label, low, high));
            }
            if i < last && bin.high != self.bins[i + 1].low {
                return Err(format!(
                    "bins '{}' and '{}' are not contiguous",
                    bin.label,
                    self.bins[i + 1].label
                ));
            }
        }
        Ok(())
    }
}

fn build_bins(edges: &[f64], labels: &[&str], open: bool) -> Vec<Bin> {
    let mut bounds: Vec<Option<f64>> = edges.iter().copied().map(Some).collect();
    if open {
        bounds.insert(0, None);
        bounds.push(None);
    }
    bounds
        .windows(2)
        .zip(labels)
        .map(|(pair, label)| Bin {
            label: (*label).to_string(),
            low: pair[0],
            high: pair[1],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_bins_boundary_values() {
        let spec = BinSpec::engine_size();
        let values = [1.9, 2.0, 2.9999, 3.0, 5.5];
        let labels: Vec<&str> = values.iter().map(|v| spec.assign(*v).unwrap()).collect();
        assert_eq!(labels, vec!["<2.0", "2.0–3.0", "2.0–3.0", "3.0–4.0", "4.0+"]);
    }

    #[test]
    fn test_open_ended_partition_is_total() {
        let spec = BinSpec::engine_size();
        let mut v = -10.0;
        while v < 10.0 {
            let matches = spec
                .bins()
                .iter()
                .filter(|b| {
                    b.low.is_none_or(|l| v >= l)
                        && b.high.is_none_or(|h| v < h)
                })
                .count();
            assert_eq!(matches, 1, "value {} must fall in exactly one bin", v);
            assert!(spec.assign(v).is_some());
            v += 0.25;
        }
    }

    #[test]
    fn test_bounded_last_bin_is_closed() {
        let spec = BinSpec::mileage();
        assert_eq!(spec.assign(0.0), Some("0–50k"));
        assert_eq!(spec.assign(50_000.0), Some("50k–100k"));
        assert_eq!(spec.assign(200_000.0), Some("150k–200k"));
        assert_eq!(spec.assign(200_000.1), None);
        assert_eq!(spec.assign(-1.0), None);
    }

    #[test]
    fn test_nan_is_unbinned() {
        assert_eq!(BinSpec::engine_size().assign(f64::NAN), None);
    }

    #[test]
    fn test_constructor_label_count_mismatch() {
        assert!(BinSpec::open_ended(&[1.0, 2.0], &["a", "b"]).is_err());
        assert!(BinSpec::bounded(&[1.0, 2.0], &["a", "b"]).is_err());
    }

    #[test]
    fn test_check_rejects_non_increasing_edges() {
        assert!(BinSpec::open_ended(&[3.0, 2.0], &["a", "b", "c"]).is_err());
        assert!(BinSpec::open_ended(&[2.0, 2.0], &["a", "b", "c"]).is_err());
    }

    #[test]
    fn test_check_rejects_duplicate_labels() {
        assert!(BinSpec::open_ended(&[2.0], &["x", "x"]).is_err());
    }

    #[test]
    fn test_deserialize_rejects_gap_on_check() {
        let json = r#"[
            {"label": "small", "low": null, "high": 2.0},
            {"label": "large", "low": 2.5, "high": null}
        ]"#;
        let spec: BinSpec = serde_json::from_str(json).unwrap();
        assert!(spec.check().is_err());
    }
}

//! Sales record schema.
//!
//! Column names follow the reference dataset (`region`, `model`, `year`,
//! `fuel_type`, `transmission`, `engine_size_l`, `sales_volume`, `price_usd`,
//! plus the optional `color` and `mileage_km`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const COL_REGION: &str = "region";
pub const COL_MODEL: &str = "model";
pub const COL_YEAR: &str = "year";
pub const COL_FUEL_TYPE: &str = "fuel_type";
pub const COL_TRANSMISSION: &str = "transmission";
pub const COL_ENGINE_SIZE: &str = "engine_size_l";
pub const COL_SALES_VOLUME: &str = "sales_volume";
pub const COL_PRICE: &str = "price_usd";
pub const COL_COLOR: &str = "color";
pub const COL_MILEAGE: &str = "mileage_km";

/// Error returned when a cell does not name a known enum member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown value '{}'", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

/// Declares a closed, string-backed enum with case-insensitive parsing.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $label)]
                $variant,
            )+
        }

        impl $name {
            /// Every member, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Canonical label as it appears in the dataset.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            /// Canonical labels of every member.
            pub fn labels() -> Vec<String> {
                Self::ALL.iter().map(|v| v.as_str().to_string()).collect()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(trimmed))
                    .ok_or_else(|| UnknownVariant(trimmed.to_string()))
            }
        }
    };
}

string_enum!(
    /// Sales region.
    Region {
        Asia => "Asia",
        Europe => "Europe",
        NorthAmerica => "North America",
        SouthAmerica => "South America",
        MiddleEast => "Middle East",
        Africa => "Africa",
    }
);

string_enum!(
    /// Fuel type of the vehicle.
    FuelType {
        Petrol => "Petrol",
        Diesel => "Diesel",
        Hybrid => "Hybrid",
        Electric => "Electric",
    }
);

string_enum!(
    /// Gearbox type.
    Transmission {
        Manual => "Manual",
        Automatic => "Automatic",
    }
);

/// A row that passed validation.
///
/// Numeric fields that the imputation policy is allowed to fill may still be
/// missing here; everything else is guaranteed present and within range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Zero-based index of the row in the input table.
    pub row: usize,
    pub region: Region,
    pub model: String,
    pub year: i32,
    pub fuel_type: FuelType,
    pub transmission: Transmission,
    pub engine_size_l: Option<f64>,
    pub sales_volume: Option<u64>,
    pub price_usd: Option<f64>,
    pub color: Option<String>,
    pub mileage_km: Option<f64>,
}

/// One complete sales observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub region: Region,
    pub model: String,
    pub year: i32,
    pub fuel_type: FuelType,
    pub transmission: Transmission,
    pub engine_size_l: f64,
    pub sales_volume: u64,
    pub price_usd: f64,
    pub color: Option<String>,
    pub mileage_km: Option<f64>,
}

impl Record {
    /// Revenue contributed by this record (`units × average price`).
    pub fn revenue(&self) -> f64 {
        self.sales_volume as f64 * self.price_usd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_parse_case_insensitive() {
        assert_eq!("north america".parse::<Region>().unwrap(), Region::NorthAmerica);
        assert_eq!("  Asia ".parse::<Region>().unwrap(), Region::Asia);
        assert!("Atlantis".parse::<Region>().is_err());
    }

    #[test]
    fn test_fuel_type_labels() {
        assert_eq!(FuelType::labels(), vec!["Petrol", "Diesel", "Hybrid", "Electric"]);
        assert_eq!(FuelType::Electric.to_string(), "Electric");
    }

    #[test]
    fn test_serde_uses_dataset_labels() {
        let json = serde_json::to_string(&Region::MiddleEast).unwrap();
        assert_eq!(json, "\"Middle East\"");
        let parsed: Transmission = serde_json::from_str("\"Automatic\"").unwrap();
        assert_eq!(parsed, Transmission::Automatic);
    }

    #[test]
    fn test_record_revenue() {
        let record = Record {
            region: Region::Europe,
            model: "X3".to_string(),
            year: 2022,
            fuel_type: FuelType::Diesel,
            transmission: Transmission::Manual,
            engine_size_l: 2.0,
            sales_volume: 10,
            price_usd: 50_000.0,
            color: None,
            mileage_km: None,
        };
        assert_eq!(record.revenue(), 500_000.0);
    }
}

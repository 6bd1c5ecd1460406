//! Fixtures shared by unit tests.

use crate::dataset::Dataset;
use crate::schema::{FuelType, Record, Region, Transmission};

#[allow(clippy::too_many_arguments)]
pub(crate) fn record(
    region: Region,
    model: &str,
    year: i32,
    fuel_type: FuelType,
    transmission: Transmission,
    engine_size_l: f64,
    sales_volume: u64,
    price_usd: f64,
) -> Record {
    Record {
        region,
        model: model.to_string(),
        year,
        fuel_type,
        transmission,
        engine_size_l,
        sales_volume,
        price_usd,
        color: None,
        mileage_km: None,
    }
}

/// Twelve records over 2020-2022, two regions, four models.
pub(crate) fn sample_dataset() -> Dataset {
    use FuelType::*;
    use Region::*;
    use Transmission::*;

    let rows = vec![
        record(Europe, "X3", 2020, Diesel, Automatic, 2.0, 120, 48_000.0),
        record(Asia, "i3", 2020, Electric, Automatic, 0.0, 80, 42_000.0),
        record(Europe, "M5", 2020, Petrol, Automatic, 4.4, 30, 110_000.0),
        record(Asia, "3 Series", 2020, Petrol, Manual, 2.0, 150, 41_000.0),
        record(Europe, "X3", 2021, Diesel, Automatic, 2.0, 130, 49_000.0),
        record(Asia, "i3", 2021, Electric, Automatic, 0.0, 110, 41_500.0),
        record(Europe, "M5", 2021, Petrol, Automatic, 4.4, 35, 112_000.0),
        record(Asia, "3 Series", 2021, Hybrid, Manual, 2.0, 140, 43_000.0),
        record(Europe, "X3", 2022, Hybrid, Automatic, 3.0, 150, 52_000.0),
        record(Asia, "i3", 2022, Electric, Automatic, 0.0, 160, 40_000.0),
        record(Europe, "M5", 2022, Petrol, Automatic, 4.4, 32, 115_000.0),
        record(Asia, "3 Series", 2022, Petrol, Manual, 2.5, 120, 44_000.0),
    ];
    Dataset::from_records(rows, "sample")
}

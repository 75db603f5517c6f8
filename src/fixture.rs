//! Fixtures for tests
use crate::input::PriceTable;
use crate::resource::{Battery, DemandResponse, ThermalGenerator};
use crate::scenario::ScenarioSet;
use chrono::NaiveDate;
use rstest::fixture;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

/// A day in January 2017
pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2017, 1, day).unwrap()
}

/// Forecast and realized prices for the first three days of January 2017, over two periods
#[fixture]
pub fn price_tables() -> (PriceTable, PriceTable) {
    let forecast = PriceTable::new([
        (date(1), vec![10.0, 10.0]),
        (date(2), vec![22.0, 28.0]),
        (date(3), vec![30.0, 40.0]),
    ])
    .unwrap();
    let real = PriceTable::new([
        (date(1), vec![15.0, 5.0]),
        (date(2), vec![20.0, 30.0]),
        (date(3), vec![30.0, 36.0]),
    ])
    .unwrap();

    (forecast, real)
}

/// Two equally likely scenarios: flat low prices and flat high prices
#[fixture]
pub fn two_scenario_prices() -> ScenarioSet {
    ScenarioSet::uniform(vec![vec![10.0, 10.0], vec![50.0, 50.0]]).unwrap()
}

#[fixture]
pub fn thermal_generator() -> ThermalGenerator {
    ThermalGenerator::default()
}

#[fixture]
pub fn battery() -> Battery {
    Battery::default()
}

#[fixture]
pub fn demand_response() -> DemandResponse {
    DemandResponse::default()
}

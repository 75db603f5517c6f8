//! Generating price scenarios from the residuals of past point forecasts.
use super::{PricePath, ScenarioSet};
use crate::input::PriceTable;
use anyhow::{Context, Result, ensure};
use chrono::NaiveDate;
use itertools::Itertools;

/// Generate `num_scenarios` equally likely price scenarios for `date`.
///
/// Scenario 0 is the point forecast for `date`. Scenario `i` (for `i >= 1`) adds the residual of
/// the forecast made `i` days earlier to the point forecast, i.e.
/// `forecast[date] - (forecast[date - i] - real[date - i])`.
///
/// The two tables must cover the same dates and there must be at least `num_scenarios - 1` rows
/// before `date`.
pub fn generate_scenarios(
    forecast: &PriceTable,
    real: &PriceTable,
    date: NaiveDate,
    num_scenarios: usize,
) -> Result<ScenarioSet> {
    let paths = residual_scenarios(forecast, real, date, num_scenarios)?;
    ScenarioSet::uniform(paths)
}

/// Generate scenarios as in [`generate_scenarios`], then move each one towards the realized price.
///
/// Each scenario `s` becomes `s - improvement_scalar * (s - real[date])`, so an
/// `improvement_scalar` of 0 leaves the scenarios unchanged and 1 collapses them all onto the
/// realized price.
pub fn generate_scenarios_improved(
    forecast: &PriceTable,
    real: &PriceTable,
    date: NaiveDate,
    num_scenarios: usize,
    improvement_scalar: f64,
) -> Result<ScenarioSet> {
    ensure!(
        (0.0..=1.0).contains(&improvement_scalar),
        "Improvement scalar must be between 0 and 1"
    );

    let real_price = real.get(date)?;
    let paths = residual_scenarios(forecast, real, date, num_scenarios)?
        .into_iter()
        .map(|path| {
            path.iter()
                .zip_eq(real_price)
                .map(|(price, real)| price - improvement_scalar * (price - real))
                .collect()
        })
        .collect();

    ScenarioSet::uniform(paths)
}

fn residual_scenarios(
    forecast: &PriceTable,
    real: &PriceTable,
    date: NaiveDate,
    num_scenarios: usize,
) -> Result<Vec<PricePath>> {
    ensure!(num_scenarios > 0, "Number of scenarios must be at least one");
    forecast.check_aligned(real)?;

    let row = forecast.position(date)?;
    ensure!(
        row + 1 >= num_scenarios,
        "Cannot generate {num_scenarios} scenarios for {date}: only {row} earlier days available"
    );

    let point_forecast = forecast.get(date)?;
    let mut paths = Vec::with_capacity(num_scenarios);
    paths.push(point_forecast.clone());
    for i in 1..num_scenarios {
        let (past_date, past_forecast) = forecast
            .get_index(row - i)
            .with_context(|| format!("Missing forecast {i} days before {date}"))?;
        let past_real = real.get(past_date)?;
        let path = point_forecast
            .iter()
            .zip_eq(past_forecast)
            .zip_eq(past_real)
            .map(|((point, past_forecast), past_real)| point - (past_forecast - past_real))
            .collect();
        paths.push(path);
    }

    Ok(paths)
}

//! Loading a case study from a directory.
//!
//! A case directory contains:
//!
//! * `case.toml`: the technology, any overrides of its default parameters, the dates to study and
//!   the bidding approaches to compare;
//! * `forecast.csv`: day-ahead point forecasts of the price, one row per day;
//! * `real.csv`: the realized prices for the same days.
use crate::formulation::BigM;
use crate::input::{
    PriceTable, check_positive, deserialise_dates, deserialise_proportion, input_err_msg, read_toml,
};
use crate::resource::{ResourceParameters, Technology};
use anyhow::{Context, Result, ensure};
use chrono::NaiveDate;
use itertools::Itertools;
use log::warn;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use std::path::Path;

const CASE_FILE_NAME: &str = "case.toml";
const FORECAST_FILE_NAME: &str = "forecast.csv";
const REAL_FILE_NAME: &str = "real.csv";

/// The ways of deciding what to bid.
///
/// The label used in input and output files is the snake-case variant name, e.g. `exclusive_lp`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(try_from = "String", into = "&'static str")]
pub enum BidApproach {
    /// Exclusive bids selected from per-scenario dispatches
    ExclusiveLp,
    /// Exclusive bids designed with the dispatch
    ExclusiveMilp,
    /// Ungrouped bids designed with the dispatch
    UngroupedMilp,
    /// A single dispatch for all scenarios
    SelfSchedule,
}

impl TryFrom<String> for BidApproach {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

fn default_bid_set_size() -> usize {
    1
}

/// One bidding approach to evaluate on every date of the case
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Approach {
    /// How bids are computed
    pub kind: BidApproach,
    /// Number of price scenarios to generate
    pub num_scenarios: usize,
    /// Number of bids to submit (ignored when self-scheduling)
    #[serde(default = "default_bid_set_size")]
    pub bid_set_size: usize,
    /// Seed the exclusive MILP with the bids from the exclusive LP
    #[serde(default)]
    pub warm_start: bool,
}

impl Approach {
    /// Check that the approach can be run
    fn validate(&self) -> Result<()> {
        ensure!(
            self.num_scenarios > 0,
            "Number of scenarios must be at least one"
        );
        ensure!(self.bid_set_size > 0, "Bid set size must be at least one");
        if self.kind == BidApproach::ExclusiveLp {
            ensure!(
                self.bid_set_size <= self.num_scenarios,
                "Bid set size for exclusive_lp cannot exceed the number of scenarios"
            );
        }
        ensure!(
            !self.warm_start || self.kind == BidApproach::ExclusiveMilp,
            "warm_start can only be used with exclusive_milp"
        );

        Ok(())
    }
}

/// The raw contents of `case.toml`
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CaseFile {
    technology: Technology,
    #[serde(default)]
    resource: toml::Table,
    #[serde(deserialize_with = "deserialise_dates")]
    dates: Vec<NaiveDate>,
    time_limit: Option<f64>,
    #[serde(default, deserialize_with = "deserialise_proportion")]
    improvement_scalar: f64,
    #[serde(default)]
    big_m: BigM,
    approaches: Vec<Approach>,
}

/// A validated case study
#[derive(Debug, Clone)]
pub struct Case {
    /// The resource which bids
    pub parameters: ResourceParameters,
    /// Days on which bids are computed and evaluated
    pub dates: Vec<NaiveDate>,
    /// Time limit for each solve, in seconds
    pub time_limit: Option<f64>,
    /// How far scenarios are moved towards the realized price (zero leaves them unchanged)
    pub improvement_scalar: f64,
    /// Bounds for the MILP formulations
    pub big_m: BigM,
    /// The approaches to compare
    pub approaches: Vec<Approach>,
    /// Point forecasts of the price
    pub forecast: PriceTable,
    /// Realized prices
    pub real: PriceTable,
}

/// Read a case study from `case_dir`
pub fn load_case(case_dir: &Path) -> Result<Case> {
    let case_path = case_dir.join(CASE_FILE_NAME);
    let case_file: CaseFile = read_toml(&case_path)?;

    let forecast = PriceTable::from_path(&case_dir.join(FORECAST_FILE_NAME))?;
    let real = PriceTable::from_path(&case_dir.join(REAL_FILE_NAME))?;
    forecast.check_aligned(&real)?;

    let technology = case_file.technology;
    let parameters = ResourceParameters::with_overrides(technology, case_file.resource)
        .with_context(|| format!("Invalid [resource] section for {technology}"))
        .with_context(|| input_err_msg(&case_path))?;
    parameters
        .model()
        .validate(forecast.num_periods())
        .with_context(|| format!("Invalid parameters for {technology}"))?;

    let case = Case {
        parameters,
        dates: case_file.dates,
        time_limit: case_file.time_limit,
        improvement_scalar: case_file.improvement_scalar,
        big_m: case_file.big_m,
        approaches: case_file.approaches,
        forecast,
        real,
    };
    case.validate().with_context(|| input_err_msg(&case_path))?;

    Ok(case)
}

impl Case {
    /// Check the settings in `case.toml` against each other and the price tables
    fn validate(&self) -> Result<()> {
        ensure!(!self.dates.is_empty(), "At least one date must be given");
        ensure!(self.dates.iter().all_unique(), "Dates must be unique");
        ensure!(
            !self.approaches.is_empty(),
            "At least one approach must be given"
        );
        if let Some(time_limit) = self.time_limit {
            check_positive(time_limit, "time_limit")?;
        }
        self.big_m.validate()?;

        for approach in &self.approaches {
            approach
                .validate()
                .with_context(|| format!("Invalid approach {}", approach.kind))?;
        }

        // Each scenario needs a forecast made on an earlier day
        let max_scenarios = self
            .approaches
            .iter()
            .map(|approach| approach.num_scenarios)
            .max()
            .unwrap_or(1);
        for date in &self.dates {
            let position = self.forecast.position(*date)?;
            ensure!(
                position + 1 >= max_scenarios,
                "Cannot generate {max_scenarios} scenarios for {date}: only {position} earlier \
                 days available"
            );
        }

        if self.forecast.max_abs_price() > self.big_m.max_price {
            warn!(
                "Forecast prices reach {} but max_price is {}",
                self.forecast.max_abs_price(),
                self.big_m.max_price
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, date};
    use float_cmp::assert_approx_eq;
    use std::fs;
    use strum::IntoEnumIterator;
    use tempfile::{TempDir, tempdir};

    fn write_prices(path: &Path, rows: &[[f64; 2]]) {
        let mut contents = "Date,h0,h1\n".to_string();
        for (day, row) in rows.iter().enumerate() {
            contents.push_str(&format!("{:02}/01/2017,{},{}\n", day + 1, row[0], row[1]));
        }
        fs::write(path, contents).unwrap();
    }

    fn case_dir(case_toml: &str) -> TempDir {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CASE_FILE_NAME), case_toml).unwrap();
        write_prices(
            &dir.path().join(FORECAST_FILE_NAME),
            &[[10.0, 10.0], [22.0, 28.0], [30.0, 40.0]],
        );
        write_prices(
            &dir.path().join(REAL_FILE_NAME),
            &[[15.0, 5.0], [20.0, 30.0], [30.0, 36.0]],
        );
        dir
    }

    const BATTERY_CASE: &str = r#"
technology = "battery"
dates = ["03/01/2017"]
time_limit = 30.0

[resource]
max_state_of_charge = 30.0

[[approaches]]
kind = "exclusive_lp"
num_scenarios = 3
bid_set_size = 2

[[approaches]]
kind = "self_schedule"
num_scenarios = 2
"#;

    #[test]
    fn test_load_case() {
        let dir = case_dir(BATTERY_CASE);
        let case = load_case(dir.path()).unwrap();
        assert_eq!(case.dates, vec![date(3)]);
        assert_eq!(case.time_limit, Some(30.0));
        assert_eq!(case.big_m, BigM::default());
        assert_eq!(case.approaches.len(), 2);
        assert_eq!(case.approaches[1].kind, BidApproach::SelfSchedule);
        assert_eq!(case.approaches[1].bid_set_size, 1);
        let ResourceParameters::Battery(battery) = &case.parameters else {
            panic!("Expected battery parameters");
        };
        assert_approx_eq!(f64, battery.max_state_of_charge, 30.0);
        assert_eq!(case.forecast.num_periods(), 2);
    }

    #[test]
    fn test_unknown_technology() {
        let dir = case_dir(&BATTERY_CASE.replace("\"battery\"", "\"wind farm\""));
        let err = load_case(dir.path()).unwrap_err();
        assert!(format!("{err:?}").contains("Unknown case study \"wind farm\""));
    }

    #[test]
    fn test_too_many_scenarios() {
        let dir = case_dir(&BATTERY_CASE.replace("num_scenarios = 3", "num_scenarios = 4"));
        let err = load_case(dir.path()).unwrap_err();
        assert_eq!(
            err.root_cause().to_string(),
            "Cannot generate 4 scenarios for 2017-01-03: only 2 earlier days available"
        );
    }

    #[test]
    fn test_invalid_approach() {
        let dir = case_dir(&BATTERY_CASE.replace("bid_set_size = 2", "bid_set_size = 4"));
        let err = load_case(dir.path()).unwrap_err();
        assert_eq!(
            err.root_cause().to_string(),
            "Bid set size for exclusive_lp cannot exceed the number of scenarios"
        );
    }

    #[test]
    fn test_improvement_scalar() {
        let case = load_case(case_dir(BATTERY_CASE).path()).unwrap();
        assert_approx_eq!(f64, case.improvement_scalar, 0.0);

        let toml = BATTERY_CASE.replace("time_limit = 30.0", "improvement_scalar = 0.25");
        let case = load_case(case_dir(&toml).path()).unwrap();
        assert_approx_eq!(f64, case.improvement_scalar, 0.25);

        let toml = BATTERY_CASE.replace("time_limit = 30.0", "improvement_scalar = 1.5");
        let err = load_case(case_dir(&toml).path()).unwrap_err();
        assert!(format!("{err:?}").contains("Value is not between 0 and 1"));
    }

    #[test]
    fn test_unknown_date() {
        let dir = case_dir(&BATTERY_CASE.replace("03/01/2017", "04/01/2017"));
        assert!(load_case(dir.path()).is_err());
    }

    #[test]
    fn test_bid_approach_labels() {
        assert_eq!(BidApproach::ExclusiveLp.to_string(), "exclusive_lp");
        assert_eq!(BidApproach::SelfSchedule.to_string(), "self_schedule");
        for approach in BidApproach::iter() {
            // Labels read from case files match those written to output files
            let label = toml::Value::try_from(approach).unwrap();
            assert_eq!(label.as_str(), Some(approach.to_string().as_str()));
            let parsed: BidApproach = label.try_into().unwrap();
            assert_eq!(parsed, approach);
        }
        assert!(BidApproach::try_from("exclusive".to_string()).is_err());
    }

    #[test]
    fn test_approach_validate() {
        let approach = Approach {
            kind: BidApproach::UngroupedMilp,
            num_scenarios: 2,
            bid_set_size: 1,
            warm_start: true,
        };
        assert_error!(
            approach.validate(),
            "warm_start can only be used with exclusive_milp"
        );
    }
}

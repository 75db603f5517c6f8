//! Functionality for running a case study.
//!
//! On each date of the case, every approach computes bids from its own price scenarios. The bids
//! are then cleared at the realized price and their utility is compared against the utility of
//! perfect information.
use crate::bid::{BidSet, BidType};
use crate::case::{Approach, BidApproach, Case};
use crate::evaluation::{evaluate, perfect_information};
use crate::formulation::{BidResult, exclusive_lp, exclusive_milp, self_schedule, ungrouped_milp};
use crate::input::DATE_FORMAT;
use crate::output::{DataWriter, StudyRecord};
use crate::scenario::{
    ScenarioSet, generate_scenarios, generate_scenarios_improved, wasserstein_distance,
};
use crate::solver::SolverOptions;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use indexmap::IndexMap;
use indexmap::map::Entry;
use log::{debug, info, warn};
use std::path::Path;
use std::time::Duration;

/// Solver options for every solve in the case
fn solver_options(case: &Case, solver_output: bool) -> SolverOptions {
    SolverOptions {
        verbose: solver_output,
        time_limit: case.time_limit.map(Duration::from_secs_f64),
        simplex: false,
    }
}

/// Generate the scenarios used on `date`, as configured for the case
pub fn case_scenarios(case: &Case, date: NaiveDate, num_scenarios: usize) -> Result<ScenarioSet> {
    if case.improvement_scalar > 0.0 {
        generate_scenarios_improved(
            &case.forecast,
            &case.real,
            date,
            num_scenarios,
            case.improvement_scalar,
        )
    } else {
        generate_scenarios(&case.forecast, &case.real, date, num_scenarios)
    }
}

/// Run the case study, writing results to `output_path`.
///
/// # Arguments
///
/// * `case` - The case to run
/// * `output_path` - The folder to which output files will be written
/// * `debug_model` - Whether to write the generated scenarios to file
/// * `solver_output` - Whether to show the solver's log
pub fn run(case: &Case, output_path: &Path, debug_model: bool, solver_output: bool) -> Result<()> {
    let options = solver_options(case, solver_output);
    let mut writer = DataWriter::create(output_path, debug_model)?;

    for date in &case.dates {
        info!("Date: {}", date.format(DATE_FORMAT));
        let real_price = case.real.get(*date)?;
        let (_, maximal_utility) = perfect_information(&case.parameters, real_price, &options)
            .with_context(|| format!("Could not compute perfect information utility for {date}"))?;

        let mut scenario_sets = IndexMap::new();
        for approach in &case.approaches {
            let scenarios = match scenario_sets.entry(approach.num_scenarios) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let scenarios = case_scenarios(case, *date, approach.num_scenarios)?;
                    writer.write_scenarios(*date, &scenarios)?;
                    entry.insert(scenarios)
                }
            };

            let (record, bids) =
                run_approach(case, *date, approach, scenarios, maximal_utility, &options)
                    .with_context(|| format!("Approach {} failed on {date}", approach.kind))?;
            match record.bid_utility {
                Some(utility) => info!(
                    "{}: utility {utility:.2} of {maximal_utility:.2} in {:.2}s",
                    approach.kind,
                    record.runtime
                ),
                None => warn!(
                    "{}: bids could not be dispatched at the realized price",
                    approach.kind
                ),
            }

            writer.write_record(&record)?;
            if let Some(bids) = bids {
                writer.write_bids(*date, approach, &bids)?;
            }
        }
    }

    writer.flush()?;

    Ok(())
}

/// Compute and evaluate the bids of one approach on one date.
///
/// Returns the record of the outcome along with the bids submitted (none for self-scheduling).
pub fn run_approach(
    case: &Case,
    date: NaiveDate,
    approach: &Approach,
    scenarios: &ScenarioSet,
    maximal_utility: f64,
    options: &SolverOptions,
) -> Result<(StudyRecord, Option<BidSet>)> {
    let parameters = &case.parameters;
    let real_price = case.real.get(date)?;
    let realized = ScenarioSet::degenerate(real_price)?;
    let distance = wasserstein_distance(&realized, scenarios)?;
    debug!(
        "{} scenarios for {date} are {distance:.2} from the realized price",
        scenarios.len()
    );

    let (bid_type, result) = match approach.kind {
        BidApproach::SelfSchedule => {
            let schedule = self_schedule(parameters, scenarios, real_price, options)?;
            let record = StudyRecord::new(
                date,
                approach,
                schedule.status,
                schedule.runtime,
                schedule.utility,
                maximal_utility,
                distance,
            );
            return Ok((record, None));
        }
        BidApproach::ExclusiveLp => (
            BidType::Exclusive,
            exclusive_lp(parameters, scenarios, approach.bid_set_size, options)?,
        ),
        BidApproach::ExclusiveMilp => (
            BidType::Exclusive,
            warm_started_milp(case, approach, scenarios, options)?,
        ),
        BidApproach::UngroupedMilp => (
            BidType::Ungrouped,
            ungrouped_milp(
                parameters,
                scenarios,
                approach.bid_set_size,
                &case.big_m,
                options,
            )?,
        ),
    };

    let outcome = evaluate(parameters, &result.bids, bid_type, real_price, options)?;
    let record = StudyRecord::new(
        date,
        approach,
        result.status,
        result.runtime,
        outcome.utility,
        maximal_utility,
        distance,
    );

    Ok((record, Some(result.bids)))
}

/// Solve the exclusive MILP, first computing exclusive LP bids to start from if requested.
///
/// The time taken to compute the starting bids counts towards the time limit and is included in
/// the reported runtime.
fn warm_started_milp(
    case: &Case,
    approach: &Approach,
    scenarios: &ScenarioSet,
    options: &SolverOptions,
) -> Result<BidResult> {
    let parameters = &case.parameters;
    if !approach.warm_start {
        return exclusive_milp(
            parameters,
            scenarios,
            approach.bid_set_size,
            &case.big_m,
            None,
            options,
        );
    }

    let num_seed_bids = approach.bid_set_size.min(scenarios.len());
    let seed = exclusive_lp(parameters, scenarios, num_seed_bids, options)?;
    let mut result = exclusive_milp(
        parameters,
        scenarios,
        approach.bid_set_size,
        &case.big_m,
        Some(&seed.bids),
        &options.remaining(seed.runtime),
    )?;
    result.runtime += seed.runtime;
    result.status = seed.status.worst(result.status);

    Ok(result)
}

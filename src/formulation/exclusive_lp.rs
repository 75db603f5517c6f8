//! Exclusive bids selected from the optimal dispatch of each scenario.
//!
//! First the resource model is solved for every scenario, so each scenario contributes one
//! candidate bid: its optimal dispatch, priced at its valuation. Then an assignment problem picks
//! `num_bids` candidates, matching each scenario to at most one selected candidate so as to
//! maximise expected profit.
use super::{BidResult, is_selected};
use crate::bid::{Bid, BidSet};
use crate::resource::{ResourceParameters, solve_scenarios};
use crate::scenario::{ScenarioSet, payment};
use crate::solver::{Problem, Sense, Solution, SolverOptions};
use anyhow::{Result, ensure};
use itertools::Itertools;
use log::{debug, warn};

/// Select `num_bids` exclusive bids from the per-scenario optimal dispatches.
///
/// The assignment problem is solved as an LP with the simplex method, so the solution is a vertex
/// of the relaxation. Only candidates whose selection indicator is (numerically) one become bids,
/// so fewer than `num_bids` bids are returned if the vertex is fractional.
pub fn exclusive_lp(
    parameters: &ResourceParameters,
    scenarios: &ScenarioSet,
    num_bids: usize,
    options: &SolverOptions,
) -> Result<BidResult> {
    ensure!(
        (1..=scenarios.len()).contains(&num_bids),
        "Number of bids must be between 1 and the number of scenarios ({})",
        scenarios.len()
    );

    let candidates = solve_scenarios(parameters, scenarios, options)?;

    // profits[c][s]: profit of candidate c if it is accepted in scenario s
    let profits = candidates
        .bundles
        .iter()
        .zip_eq(&candidates.valuations)
        .map(|(bundle, valuation)| {
            scenarios
                .iter()
                .map(|(prices, _)| valuation - payment(prices, bundle))
                .collect_vec()
        })
        .collect_vec();
    let (selected, solution) = select_candidates(
        &profits,
        scenarios.probabilities(),
        num_bids,
        &options.remaining(candidates.runtime),
    )?;

    let bids: BidSet = selected
        .iter()
        .map(|&c| Bid {
            quantity: candidates.bundles[c].clone(),
            price: candidates.valuations[c],
        })
        .collect();

    Ok(BidResult {
        bids,
        objective: solution.objective,
        status: candidates.status.worst(solution.status),
        runtime: candidates.runtime + solution.runtime,
    })
}

/// Solve the assignment of candidates to scenarios, returning the indices of the selected
/// candidates in order.
///
/// `profits[c][s]` is the profit of candidate `c` in scenario `s`. Each scenario is matched to at
/// most one candidate and exactly `num_bids` candidates are selected, in the LP relaxation.
fn select_candidates(
    profits: &[Vec<f64>],
    probabilities: &[f64],
    num_bids: usize,
    options: &SolverOptions,
) -> Result<(Vec<usize>, Solution)> {
    let num_candidates = profits.len();
    let mut problem = Problem::default();
    let selected = (0..num_candidates)
        .map(|_| problem.add_column(0.0, 0.0..=1.0))
        .collect_vec();

    // assigned[c][s]: candidate c is the bid accepted in scenario s
    let assigned = profits
        .iter()
        .map(|row| {
            row.iter()
                .zip_eq(probabilities)
                .map(|(profit, probability)| problem.add_column(probability * profit, 0.0..=1.0))
                .collect_vec()
        })
        .collect_vec();

    for s in 0..probabilities.len() {
        problem.add_row(..=1.0, assigned.iter().map(|row| (row[s], 1.0)));
    }
    for (row, delta) in assigned.iter().zip_eq(&selected) {
        for gamma in row {
            problem.add_row(..=0.0, [(*gamma, 1.0), (*delta, -1.0)]);
        }
    }
    let num_bids_f64 = num_bids as f64;
    problem.add_row(
        num_bids_f64..=num_bids_f64,
        selected.iter().map(|delta| (*delta, 1.0)),
    );

    let solution = problem
        .solve(Sense::Maximise, &options.using_simplex())?
        .into_solution("bid selection problem")?;
    let chosen = selected
        .iter()
        .positions(|delta| is_selected(solution.value(*delta)))
        .collect_vec();
    if chosen.len() < num_bids {
        warn!(
            "Bid selection is fractional: only {} of {num_bids} bids selected",
            chosen.len()
        );
    }
    debug!(
        "Selected {} of {num_candidates} candidate bids (objective {})",
        chosen.len(),
        solution.objective
    );

    Ok((chosen, solution))
}

//! Bids designed jointly with the dispatch, as a mixed-integer linear program.
//!
//! The resource model is extended with bid quantities `x[b][t]`, bid prices `p[b]` and binary
//! acceptance indicators `γ[b][s]`. The dispatch in each scenario must equal the sum of the
//! accepted bids. This is linearised with rejected-quantity columns `r[b][s][t]`, which equal
//! `x[b][t]` when the bid is rejected and zero when it is accepted:
//!
//! ```text
//! -M1 (1 - γ) <= r <= M1 (1 - γ)
//! -M1 γ <= x - r <= M1 γ
//! x̃[s][t] = Σ_b (x[b][t] - r[b][s][t])
//! ```
//!
//! The clearing rule then decides which bids are accepted in each scenario, in terms of the profit
//! `p[b] - Σ_t price[s][t] * x[b][t]`:
//!
//! * exclusive: at most one bid is accepted, and it must be the most profitable one if any bid
//!   has non-negative profit;
//! * ungrouped: each bid is accepted exactly when its profit is non-negative.
use super::BidResult;
use crate::bid::{Bid, BidSet, BidType};
use crate::input::check_positive;
use crate::resource::{ResourceParameters, ResourceProblem, build};
use crate::scenario::ScenarioSet;
use crate::solver::{Problem, Sense, Solution, SolveOutcome, SolveStatus, SolverOptions, Variable};
use anyhow::{Result, ensure};
use itertools::{Itertools, iproduct};
use log::{debug, warn};
use serde::Deserialize;
use std::time::{Duration, Instant};

/// Bounds used by the big-M linearisation.
///
/// These must dominate every quantity and price which can occur, but the looser they are the
/// weaker the LP relaxation.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BigM {
    /// Largest quantity a bid can offer in one period
    pub max_quantity: f64,
    /// Largest absolute price expected in any period
    pub max_price: f64,
}

impl Default for BigM {
    fn default() -> Self {
        Self {
            max_quantity: 600.0,
            max_price: 300.0,
        }
    }
}

impl BigM {
    /// Create a new [`BigM`] from declared bounds on quantity and price
    pub fn new(max_quantity: f64, max_price: f64) -> Result<Self> {
        let big_m = Self {
            max_quantity,
            max_price,
        };
        big_m.validate()?;
        Ok(big_m)
    }

    /// Check that both bounds are finite and positive
    pub fn validate(&self) -> Result<()> {
        check_positive(self.max_quantity, "max_quantity")?;
        check_positive(self.max_price, "max_price")
    }

    /// The bound on quantities, `M1`
    pub fn quantity(&self) -> f64 {
        self.max_quantity
    }

    /// The bound on bid profits over a horizon of `num_periods`, `M2 = 2 * T * max_price *
    /// max_quantity`.
    ///
    /// A profit is a bid price less a payment, each of which is bounded by [`BigM::price`].
    pub fn profit(&self, num_periods: usize) -> f64 {
        2.0 * self.price(num_periods)
    }

    /// The bound on bid prices over a horizon of `num_periods`
    pub fn price(&self, num_periods: usize) -> f64 {
        num_periods as f64 * self.max_price * self.max_quantity
    }
}

/// Handles to the bid columns of the extended problem
struct BidVariables {
    /// `x[b][t]`
    quantity: Vec<Vec<Variable>>,
    /// `p[b]`
    price: Vec<Variable>,
}

/// Design `num_bids` exclusive bids.
///
/// If `warm_start` is given, the solver is seeded with a feasible solution in which the bids are
/// fixed to these values (padded with zero bids if there are fewer than `num_bids`).
pub fn exclusive_milp(
    parameters: &ResourceParameters,
    scenarios: &ScenarioSet,
    num_bids: usize,
    big_m: &BigM,
    warm_start: Option<&BidSet>,
    options: &SolverOptions,
) -> Result<BidResult> {
    solve_bids(
        parameters,
        scenarios,
        num_bids,
        BidType::Exclusive,
        big_m,
        warm_start,
        options,
    )
}

/// Design `num_bids` ungrouped bids
pub fn ungrouped_milp(
    parameters: &ResourceParameters,
    scenarios: &ScenarioSet,
    num_bids: usize,
    big_m: &BigM,
    options: &SolverOptions,
) -> Result<BidResult> {
    solve_bids(
        parameters,
        scenarios,
        num_bids,
        BidType::Ungrouped,
        big_m,
        None,
        options,
    )
}

fn solve_bids(
    parameters: &ResourceParameters,
    scenarios: &ScenarioSet,
    num_bids: usize,
    bid_type: BidType,
    big_m: &BigM,
    warm_start: Option<&BidSet>,
    options: &SolverOptions,
) -> Result<BidResult> {
    ensure!(num_bids > 0, "Number of bids must be at least one");
    big_m.validate()?;
    if scenarios.max_abs_price() > big_m.max_price {
        warn!(
            "Scenario prices reach {} but max_price is {}: bids may be cut off",
            scenarios.max_abs_price(),
            big_m.max_price
        );
    }

    let mut runtime = Duration::ZERO;
    let mut status = SolveStatus::Optimal;
    let mut start = None;
    if let Some(bids) = warm_start {
        let started = Instant::now();
        let solution =
            feasible_start(parameters, scenarios, num_bids, bid_type, big_m, bids, options)?;
        runtime += started.elapsed();
        if let Some(solution) = solution {
            status = solution.status;
            start = Some(solution.columns().to_vec());
        }
    }
    let options = options.remaining(runtime);

    let (problem, bid_vars) = build_bid_problem(parameters, scenarios, num_bids, bid_type, big_m)?;
    let outcome = match start {
        Some(start) => problem.solve_with_start(Sense::Maximise, &options, &start)?,
        None => problem.solve(Sense::Maximise, &options)?,
    };
    let solution = outcome.into_solution(&format!("{bid_type:?} bidding problem"))?;
    runtime += solution.runtime;
    status = status.worst(solution.status);

    let bids = BidSet::new(
        bid_vars
            .quantity
            .iter()
            .zip_eq(&bid_vars.price)
            .map(|(quantity, price)| Bid {
                quantity: solution.values(quantity),
                price: solution.value(*price),
            })
            .collect(),
    )?;
    debug!(
        "Solved {bid_type:?} bidding problem with {num_bids} bids in {:.2}s",
        runtime.as_secs_f64()
    );

    Ok(BidResult {
        bids,
        objective: solution.objective,
        status,
        runtime,
    })
}

/// Solve the bidding problem with the bids fixed, giving a full feasible starting point.
///
/// Returns `None` (with a warning) if the fixed problem cannot be solved, in which case the bidding
/// problem is solved without a starting point.
fn feasible_start(
    parameters: &ResourceParameters,
    scenarios: &ScenarioSet,
    num_bids: usize,
    bid_type: BidType,
    big_m: &BigM,
    bids: &BidSet,
    options: &SolverOptions,
) -> Result<Option<Solution>> {
    ensure!(
        bids.len() <= num_bids,
        "Warm start has {} bids but only {num_bids} are allowed",
        bids.len()
    );
    let bids = bids.padded(num_bids, scenarios.num_periods());

    let (mut problem, bid_vars) =
        build_bid_problem(parameters, scenarios, num_bids, bid_type, big_m)?;
    for ((quantity_vars, price_var), bid) in
        bid_vars.quantity.iter().zip_eq(&bid_vars.price).zip_eq(bids.iter())
    {
        ensure!(
            bid.quantity.len() == quantity_vars.len(),
            "Warm start bids must cover {} periods",
            quantity_vars.len()
        );
        for (var, quantity) in quantity_vars.iter().zip_eq(&bid.quantity) {
            problem.fix(*var, *quantity);
        }
        problem.fix(*price_var, bid.price);
    }

    match problem.solve(Sense::Maximise, options) {
        Ok(SolveOutcome::Solved(solution)) => Ok(Some(solution)),
        Ok(SolveOutcome::Infeasible { .. }) => {
            warn!("Warm start bids are infeasible; solving without a starting point");
            Ok(None)
        }
        Err(err) => {
            warn!("Could not complete warm start ({err}); solving without a starting point");
            Ok(None)
        }
    }
}

/// Build the resource model extended with bids and the clearing rule for `bid_type`
fn build_bid_problem(
    parameters: &ResourceParameters,
    scenarios: &ScenarioSet,
    num_bids: usize,
    bid_type: BidType,
    big_m: &BigM,
) -> Result<(Problem, BidVariables)> {
    let ResourceProblem {
        mut problem,
        variables,
    } = build(parameters, scenarios)?;
    let num_periods = scenarios.num_periods();
    let num_scenarios = scenarios.len();
    let m1 = big_m.quantity();
    let m2 = big_m.profit(num_periods);
    let quantity_bounds = parameters.model().direction().quantity_bounds(m1);
    let price_bound = big_m.price(num_periods);

    let bid_vars = BidVariables {
        quantity: (0..num_bids)
            .map(|_| {
                (0..num_periods)
                    .map(|_| problem.add_column(0.0, quantity_bounds.clone()))
                    .collect_vec()
            })
            .collect(),
        price: (0..num_bids)
            .map(|_| problem.add_column(0.0, -price_bound..=price_bound))
            .collect(),
    };
    // accepted[b][s]
    let accepted = (0..num_bids)
        .map(|_| {
            (0..num_scenarios)
                .map(|_| problem.add_binary(0.0))
                .collect_vec()
        })
        .collect_vec();
    // rejected[b][s][t]
    let rejected = (0..num_bids)
        .map(|_| {
            (0..num_scenarios)
                .map(|_| {
                    (0..num_periods)
                        .map(|_| problem.add_column(0.0, quantity_bounds.clone()))
                        .collect_vec()
                })
                .collect_vec()
        })
        .collect_vec();

    for (b, s, t) in iproduct!(0..num_bids, 0..num_scenarios, 0..num_periods) {
        let x = bid_vars.quantity[b][t];
        let r = rejected[b][s][t];
        let gamma = accepted[b][s];
        problem.add_row(..=m1, [(r, 1.0), (gamma, m1)]);
        problem.add_row(-m1.., [(r, 1.0), (gamma, -m1)]);
        problem.add_row(..=0.0, [(x, 1.0), (r, -1.0), (gamma, -m1)]);
        problem.add_row(0.0.., [(x, 1.0), (r, -1.0), (gamma, m1)]);
    }

    // Dispatch is the sum of the accepted bids
    for (s, t) in iproduct!(0..num_scenarios, 0..num_periods) {
        let mut terms = vec![(variables.dispatch[s][t], 1.0)];
        for b in 0..num_bids {
            terms.push((bid_vars.quantity[b][t], -1.0));
            terms.push((rejected[b][s][t], 1.0));
        }
        problem.add_row(0.0..=0.0, terms);
    }

    for (s, (prices, _)) in scenarios.iter().enumerate() {
        // profit[b] = p[b] - Σ_t price[t] * x[b][t]
        let profit = |b: usize| {
            let mut terms = vec![(bid_vars.price[b], 1.0)];
            terms.extend(
                bid_vars.quantity[b]
                    .iter()
                    .zip_eq(prices)
                    .map(|(x, price)| (*x, -price)),
            );
            terms
        };

        match bid_type {
            BidType::Exclusive => {
                let best = problem.add_column(0.0, 0.0..);
                for b in 0..num_bids {
                    let gamma = accepted[b][s];

                    // z >= profit[b]
                    let mut terms = vec![(best, 1.0)];
                    terms.extend(profit(b).into_iter().map(|(v, c)| (v, -c)));
                    problem.add_row(0.0.., terms.clone());

                    // z <= profit[b] + M2 (1 - γ)
                    terms.push((gamma, m2));
                    problem.add_row(..=m2, terms);
                }

                // At most one winner, and a winner whenever some bid is in the money
                problem.add_row(..=1.0, (0..num_bids).map(|b| (accepted[b][s], 1.0)));
                problem.add_row(
                    ..=0.0,
                    [(best, 1.0)]
                        .into_iter()
                        .chain((0..num_bids).map(|b| (accepted[b][s], -m2))),
                );
            }
            BidType::Ungrouped => {
                for b in 0..num_bids {
                    // -M2 (1 - γ) <= profit[b] <= M2 γ
                    let mut terms = profit(b);
                    terms.push((accepted[b][s], -m2));
                    problem.add_row(-m2..=0.0, terms);
                }
            }
        }
    }

    Ok((problem, bid_vars))
}

/// Whether bid `b` is accepted at `prices`, according to the clearing rule encoded above
#[cfg(test)]
fn accepted_by_rule(bids: &BidSet, bid_type: BidType, prices: &[f64]) -> Vec<bool> {
    let profits = bids.iter().map(|bid| bid.profit(prices)).collect_vec();
    match bid_type {
        BidType::Exclusive => {
            let best = profits
                .iter()
                .copied()
                .position_max_by(f64::total_cmp)
                .filter(|&b| profits[b] >= 0.0);
            (0..profits.len()).map(|b| Some(b) == best).collect()
        }
        BidType::Ungrouped => profits.iter().map(|profit| *profit >= 0.0).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, two_scenario_prices};
    use crate::evaluation::perfect_information;
    use crate::formulation::exclusive_lp;
    use crate::resource::Technology;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[test]
    fn test_big_m() {
        let big_m = BigM::default();
        assert_approx_eq!(f64, big_m.quantity(), 600.0);
        assert_approx_eq!(f64, big_m.price(24), 4_320_000.0);
        assert_approx_eq!(f64, big_m.profit(24), 8_640_000.0);
        assert_approx_eq!(f64, big_m.profit(1), 360_000.0);
        assert_error!(
            BigM::new(0.0, 300.0),
            "max_quantity must be a finite number greater than zero"
        );
    }

    #[rstest]
    fn test_exclusive_thermal(two_scenario_prices: ScenarioSet) {
        let parameters = ResourceParameters::default_for(Technology::ThermalGenerator);
        let result = exclusive_milp(
            &parameters,
            &two_scenario_prices,
            2,
            &BigM::default(),
            None,
            &SolverOptions::default(),
        )
        .unwrap();

        // With one bid per scenario, the bids can reproduce the optimal dispatch of each
        assert_approx_eq!(f64, result.objective, 5500.0, epsilon = 1e-3);
        assert_eq!(result.bids.len(), 2);
        assert!(result.bids.iter().all(|bid| bid.quantity.iter().all(|q| *q <= 1e-6)));

        // The bids clear in the high-price scenario and only trade then
        let high = two_scenario_prices.prices(1);
        let accepted = accepted_by_rule(&result.bids, BidType::Exclusive, high);
        let winner = accepted.iter().position(|a| *a).unwrap();
        for (q, expected) in result.bids.bids()[winner].quantity.iter().zip([-200.0, -400.0]) {
            assert_approx_eq!(f64, *q, expected, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_exclusive_high_prices_match_perfect_information() {
        // Over a whole day at the largest declared price, one bid can carry the whole profit
        let prices = vec![300.0; 24];
        let scenarios = ScenarioSet::degenerate(&prices).unwrap();
        let parameters = ResourceParameters::default_for(Technology::ThermalGenerator);
        let options = SolverOptions::default();
        let result =
            exclusive_milp(&parameters, &scenarios, 1, &BigM::default(), None, &options).unwrap();
        let (_, maximal) = perfect_information(&parameters, &prices, &options).unwrap();
        assert!(maximal > BigM::default().profit(1));
        assert_approx_eq!(f64, result.objective, maximal, epsilon = 1e-4 * maximal);
    }

    #[rstest]
    fn test_exclusive_single_bid_bounded_by_lp(two_scenario_prices: ScenarioSet) {
        // A single designed bid can do no better than two selected bids
        let parameters = ResourceParameters::default_for(Technology::ThermalGenerator);
        let options = SolverOptions::default();
        let lp = exclusive_lp(&parameters, &two_scenario_prices, 2, &options).unwrap();
        let milp = exclusive_milp(
            &parameters,
            &two_scenario_prices,
            1,
            &BigM::default(),
            None,
            &options,
        )
        .unwrap();
        assert!(milp.objective <= lp.objective + 1e-3);
        assert!(milp.objective >= -1e-6);
    }

    #[rstest]
    fn test_exclusive_warm_start(two_scenario_prices: ScenarioSet) {
        let parameters = ResourceParameters::default_for(Technology::ThermalGenerator);
        let options = SolverOptions::default();
        let lp = exclusive_lp(&parameters, &two_scenario_prices, 1, &options).unwrap();
        let result = exclusive_milp(
            &parameters,
            &two_scenario_prices,
            2,
            &BigM::default(),
            Some(&lp.bids),
            &options,
        )
        .unwrap();
        assert_approx_eq!(f64, result.objective, 5500.0, epsilon = 1e-3);
    }

    #[rstest]
    fn test_warm_start_runtime_and_status(two_scenario_prices: ScenarioSet) {
        let parameters = ResourceParameters::default_for(Technology::ThermalGenerator);
        let options = SolverOptions::default();
        let lp = exclusive_lp(&parameters, &two_scenario_prices, 2, &options).unwrap();
        let cold = exclusive_milp(
            &parameters,
            &two_scenario_prices,
            2,
            &BigM::default(),
            None,
            &options,
        )
        .unwrap();
        let warm = exclusive_milp(
            &parameters,
            &two_scenario_prices,
            2,
            &BigM::default(),
            Some(&lp.bids),
            &options,
        )
        .unwrap();
        assert!(warm.status.is_optimal());
        assert_approx_eq!(f64, warm.objective, cold.objective, epsilon = 1e-3);
    }

    #[rstest]
    fn test_warm_start_infeasible_bids(two_scenario_prices: ScenarioSet) {
        // A generator cannot buy, so these bids give no starting point
        let parameters = ResourceParameters::default_for(Technology::ThermalGenerator);
        let bids = BidSet::new(vec![Bid {
            quantity: vec![100.0, 100.0],
            price: 0.0,
        }])
        .unwrap();
        let result = exclusive_milp(
            &parameters,
            &two_scenario_prices,
            1,
            &BigM::default(),
            Some(&bids),
            &SolverOptions::default(),
        )
        .unwrap();
        assert!(result.objective >= -1e-6);
    }

    #[rstest]
    fn test_warm_start_too_many_bids(two_scenario_prices: ScenarioSet) {
        let parameters = ResourceParameters::default_for(Technology::Battery);
        let bids = BidSet::new(vec![Bid::zero(2), Bid::zero(2)]).unwrap();
        assert_error!(
            exclusive_milp(
                &parameters,
                &two_scenario_prices,
                1,
                &BigM::default(),
                Some(&bids),
                &SolverOptions::default()
            ),
            "Warm start has 2 bids but only 1 are allowed"
        );
    }

    #[rstest]
    #[case(Technology::ThermalGenerator)]
    #[case(Technology::Battery)]
    fn test_ungrouped_bids_respect_clearing(
        two_scenario_prices: ScenarioSet,
        #[case] technology: Technology,
    ) {
        let parameters = ResourceParameters::default_for(technology);
        let result = ungrouped_milp(
            &parameters,
            &two_scenario_prices,
            2,
            &BigM::default(),
            &SolverOptions::default(),
        )
        .unwrap();
        assert_eq!(result.bids.len(), 2);
        assert!(result.objective >= -1e-6);

        // Bid quantities follow the direction of the technology
        if technology == Technology::ThermalGenerator {
            assert!(result.bids.iter().all(|bid| bid.quantity.iter().all(|q| *q <= 1e-6)));
        }
    }

    #[test]
    fn test_accepted_by_rule() {
        let bids = BidSet::new(vec![
            Bid {
                quantity: vec![-1.0],
                price: -5.0,
            },
            Bid {
                quantity: vec![-2.0],
                price: -12.0,
            },
        ])
        .unwrap();

        // Profits at a price of 10 are 5 and 8
        assert_eq!(
            accepted_by_rule(&bids, BidType::Exclusive, &[10.0]),
            vec![false, true]
        );
        assert_eq!(
            accepted_by_rule(&bids, BidType::Ungrouped, &[10.0]),
            vec![true, true]
        );
        // Profits at a price of 5.5 are 0.5 and -1
        assert_eq!(
            accepted_by_rule(&bids, BidType::Ungrouped, &[5.5]),
            vec![true, false]
        );
        assert_eq!(
            accepted_by_rule(&bids, BidType::Exclusive, &[1.0]),
            vec![false, false]
        );
    }
}

//! A single dispatch committed to in advance, regardless of the price scenario.
use crate::resource::{ResourceParameters, ResourceProblem, build, fixed_dispatch_utility};
use crate::scenario::{PricePath, ScenarioSet};
use crate::solver::{Sense, SolveStatus, SolverOptions};
use anyhow::{Result, ensure};
use itertools::iproduct;
use log::debug;
use std::time::Duration;

/// A dispatch schedule and its realized utility
#[derive(Debug, Clone)]
pub struct SelfSchedule {
    /// The dispatch in every period
    pub schedule: PricePath,
    /// Utility of the schedule at the realized price, or `None` if it is infeasible there
    pub utility: Option<f64>,
    /// How the scheduling solve terminated
    pub status: SolveStatus,
    /// Time spent finding the schedule
    pub runtime: Duration,
}

/// Find the dispatch which maximises expected profit when it must be the same in every scenario,
/// then value it at `real_price`
pub fn self_schedule(
    parameters: &ResourceParameters,
    scenarios: &ScenarioSet,
    real_price: &[f64],
    options: &SolverOptions,
) -> Result<SelfSchedule> {
    ensure!(
        real_price.len() == scenarios.num_periods(),
        "Realized price covers {} periods but scenarios cover {}",
        real_price.len(),
        scenarios.num_periods()
    );

    let ResourceProblem {
        mut problem,
        variables,
    } = build(parameters, scenarios)?;
    let dispatch = &variables.dispatch;
    for (s, t) in iproduct!(1..scenarios.len(), 0..scenarios.num_periods()) {
        problem.add_row(0.0..=0.0, [(dispatch[s][t], 1.0), (dispatch[0][t], -1.0)]);
    }

    let solution = problem
        .solve(Sense::Maximise, options)?
        .into_solution("self-schedule problem")?;
    let schedule = solution.values(&dispatch[0]);
    debug!(
        "Self-schedule has expected profit {} across {} scenarios",
        solution.objective,
        scenarios.len()
    );

    let utility = fixed_dispatch_utility(parameters, real_price, &schedule, options)?;

    Ok(SelfSchedule {
        schedule,
        utility,
        status: solution.status,
        runtime: solution.runtime,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::perfect_information;
    use crate::fixture::{assert_error, two_scenario_prices};
    use crate::resource::Technology;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    fn test_thermal_schedule(two_scenario_prices: ScenarioSet) {
        // Running at full ramp loses 0.5 * (-13000) + 0.5 * 11000 on average, so stay off
        let parameters = ResourceParameters::default_for(Technology::ThermalGenerator);
        let result = self_schedule(
            &parameters,
            &two_scenario_prices,
            &[50.0, 50.0],
            &SolverOptions::default(),
        )
        .unwrap();
        assert!(result.schedule.iter().all(|q| q.abs() < 1e-6));
        assert_approx_eq!(f64, result.utility.unwrap(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_single_scenario_matches_resource_model() {
        // With one scenario at the realized price, the schedule is the perfectly informed one
        let price = [50.0, 50.0];
        let parameters = ResourceParameters::default_for(Technology::ThermalGenerator);
        let scenarios = ScenarioSet::degenerate(&price).unwrap();
        let result =
            self_schedule(&parameters, &scenarios, &price, &SolverOptions::default()).unwrap();
        for (q, expected) in result.schedule.iter().zip([-200.0, -400.0]) {
            assert_approx_eq!(f64, *q, expected, epsilon = 1e-6);
        }
        assert_approx_eq!(f64, result.utility.unwrap(), 11000.0, epsilon = 1e-6);
    }

    #[rstest]
    fn test_schedule_shared_by_scenarios(two_scenario_prices: ScenarioSet) {
        let parameters = ResourceParameters::default_for(Technology::Battery);
        let result = self_schedule(
            &parameters,
            &two_scenario_prices,
            &[10.0, 50.0],
            &SolverOptions::default(),
        )
        .unwrap();
        assert_eq!(result.schedule.len(), 2);
        assert!(result.utility.is_some());
    }

    #[rstest]
    #[case(Technology::ThermalGenerator, &[30.0, 45.0])]
    #[case(Technology::Battery, &[12.0, 48.0])]
    fn test_bounded_by_perfect_information(
        two_scenario_prices: ScenarioSet,
        #[case] technology: Technology,
        #[case] real_price: &[f64],
    ) {
        let parameters = ResourceParameters::default_for(technology);
        let options = SolverOptions::default();
        let result = self_schedule(&parameters, &two_scenario_prices, real_price, &options).unwrap();
        let (_, maximal) = perfect_information(&parameters, real_price, &options).unwrap();
        assert!(result.utility.unwrap() <= maximal + 1e-6);
    }

    #[rstest]
    fn test_wrong_price_length(two_scenario_prices: ScenarioSet) {
        let parameters = ResourceParameters::default_for(Technology::Battery);
        assert_error!(
            self_schedule(
                &parameters,
                &two_scenario_prices,
                &[10.0],
                &SolverOptions::default()
            ),
            "Realized price covers 1 periods but scenarios cover 2"
        );
    }
}

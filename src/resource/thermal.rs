//! A thermal generator with unit commitment and a piecewise-linear cost curve.
use super::ResourceModel;
use crate::input::{check_non_negative, check_positive};
use crate::solver::{Problem, Variable};
use anyhow::{Result, ensure};
use itertools::Itertools;
use serde::Deserialize;
use std::ops::RangeInclusive;

/// Parameters of a thermal generator
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThermalGenerator {
    /// Cost of running for one period, regardless of output
    pub no_load_cost: f64,
    /// Marginal cost of each generation block, in ascending order
    pub marginal_costs: Vec<f64>,
    /// Cost of starting up
    pub startup_cost: f64,
    /// Cost of shutting down
    pub shutdown_cost: f64,
    /// Maximum increase in output between consecutive periods
    pub ramp_up_rate: f64,
    /// Maximum decrease in output between consecutive periods
    pub ramp_down_rate: f64,
    /// Minimum output while running
    pub min_stable_generation: f64,
    /// Maximum output
    pub max_production_limit: f64,
    /// Size of each generation block
    pub max_production_block: Vec<f64>,
    /// Number of periods the generator must stay on after starting up
    pub min_up_time: usize,
    /// Number of periods the generator must stay off after shutting down
    pub min_down_time: usize,
    /// Output in the final period of the previous day
    pub initial_operating_state: f64,
    /// Number of periods at the start of the day for which the generator must be off
    pub initial_off_hours: usize,
    /// Number of periods at the start of the day for which the generator must be on
    pub initial_on_hours: usize,
}

impl Default for ThermalGenerator {
    fn default() -> Self {
        Self {
            no_load_cost: 2000.0,
            marginal_costs: vec![20.0, 25.0, 40.0],
            startup_cost: 2000.0,
            shutdown_cost: 500.0,
            ramp_up_rate: 200.0,
            ramp_down_rate: 200.0,
            min_stable_generation: 100.0,
            max_production_limit: 600.0,
            max_production_block: vec![200.0, 200.0, 200.0],
            min_up_time: 4,
            min_down_time: 4,
            initial_operating_state: 0.0,
            initial_off_hours: 0,
            initial_on_hours: 0,
        }
    }
}

impl ThermalGenerator {
    /// Commitment before the first period: on if the generator was producing
    fn initial_commitment(&self) -> f64 {
        if self.initial_operating_state > 0.0 {
            1.0
        } else {
            0.0
        }
    }

    /// Add the unit-commitment constraints for one scenario, returning the commitment variables
    pub(crate) fn add_unit_commitment(
        &self,
        problem: &mut Problem,
        dispatch: &[Variable],
        valuation: Variable,
    ) -> Vec<Variable> {
        let num_periods = dispatch.len();
        let initial = self.initial_commitment();
        let commitment = (0..num_periods)
            .map(|_| problem.add_binary(0.0))
            .collect_vec();
        let startup = (0..num_periods)
            .map(|_| problem.add_column(0.0, 0.0..))
            .collect_vec();
        let shutdown = (0..num_periods)
            .map(|_| problem.add_column(0.0, 0.0..))
            .collect_vec();

        let mut valuation_terms = vec![(valuation, 1.0)];
        for t in 0..num_periods {
            let blocks = self
                .max_production_block
                .iter()
                .map(|_| problem.add_column(0.0, f64::NEG_INFINITY..=0.0))
                .collect_vec();

            // Output is the sum over blocks; each block is only available while committed
            problem.add_row(
                0.0..=0.0,
                blocks
                    .iter()
                    .map(|block| (*block, -1.0))
                    .chain([(dispatch[t], 1.0)]),
            );
            for (block, max_block) in blocks.iter().zip_eq(&self.max_production_block) {
                problem.add_row(..=0.0, [(*block, -1.0), (commitment[t], -max_block)]);
            }
            problem.add_row(..=0.0, [
                (commitment[t], self.min_stable_generation),
                (dispatch[t], 1.0),
            ]);
            problem.add_row(..=0.0, [
                (dispatch[t], -1.0),
                (commitment[t], -self.max_production_limit),
            ]);

            // v = Σ_t (-no_load * u - c_up - c_down + Σ_q mc[q] * p_block[q])
            valuation_terms.extend([
                (commitment[t], self.no_load_cost),
                (startup[t], 1.0),
                (shutdown[t], 1.0),
            ]);
            valuation_terms.extend(
                blocks
                    .iter()
                    .zip_eq(&self.marginal_costs)
                    .map(|(block, cost)| (*block, -cost)),
            );
        }
        problem.add_row(0.0..=0.0, valuation_terms);

        self.add_ramping(problem, dispatch);

        // Start-up and shut-down costs, with the previous day's commitment before period 0
        for t in 0..num_periods {
            if t == 0 {
                problem.add_row(-self.startup_cost * initial.., [
                    (startup[0], 1.0),
                    (commitment[0], -self.startup_cost),
                ]);
                problem.add_row(self.shutdown_cost * initial.., [
                    (shutdown[0], 1.0),
                    (commitment[0], self.shutdown_cost),
                ]);
            } else {
                problem.add_row(0.0.., [
                    (startup[t], 1.0),
                    (commitment[t], -self.startup_cost),
                    (commitment[t - 1], self.startup_cost),
                ]);
                problem.add_row(0.0.., [
                    (shutdown[t], 1.0),
                    (commitment[t], self.shutdown_cost),
                    (commitment[t - 1], -self.shutdown_cost),
                ]);
            }
        }

        for u in commitment.iter().take(self.initial_off_hours) {
            problem.fix(*u, 0.0);
        }
        for u in commitment.iter().take(self.initial_on_hours) {
            problem.fix(*u, 1.0);
        }

        self.add_min_up_time(problem, &commitment, initial);
        self.add_min_down_time(problem, &commitment, initial);

        commitment
    }

    /// Bound changes in output, including from the previous day's final output
    fn add_ramping(&self, problem: &mut Problem, dispatch: &[Variable]) {
        // Output is -x̃, so a ramp up is a decrease in x̃
        let ramp = -self.ramp_down_rate..=self.ramp_up_rate;
        let initial = self.initial_operating_state;
        problem.add_row(initial - self.ramp_down_rate..=initial + self.ramp_up_rate, [(
            dispatch[0],
            -1.0,
        )]);
        for (prev, next) in dispatch.iter().tuple_windows() {
            problem.add_row(ramp.clone(), [(*next, -1.0), (*prev, 1.0)]);
        }
    }

    /// A unit which starts up must stay on for `min_up_time` periods or until the end of the day.
    ///
    /// For a window `t..t+k`: `k * (u[t] - u[t-1]) <= Σ_{j in window} u[j]`.
    fn add_min_up_time(&self, problem: &mut Problem, commitment: &[Variable], initial: f64) {
        for (t, window) in windows(commitment.len(), self.min_up_time) {
            let k = window.len() as f64;
            let mut terms = vec![(commitment[t], k)];
            terms.extend(window.map(|j| (commitment[j], -1.0)));
            let upper = if t == 0 {
                k * initial
            } else {
                terms.push((commitment[t - 1], -k));
                0.0
            };
            problem.add_row(..=upper, terms);
        }
    }

    /// A unit which shuts down must stay off for `min_down_time` periods or until the end of the
    /// day.
    ///
    /// For a window `t..t+k`: `k * (u[t-1] - u[t]) <= Σ_{j in window} (1 - u[j])`.
    fn add_min_down_time(&self, problem: &mut Problem, commitment: &[Variable], initial: f64) {
        for (t, window) in windows(commitment.len(), self.min_down_time) {
            let k = window.len() as f64;
            let mut terms = vec![(commitment[t], -k)];
            terms.extend(window.map(|j| (commitment[j], 1.0)));
            let upper = if t == 0 {
                k - k * initial
            } else {
                terms.push((commitment[t - 1], k));
                k
            };
            problem.add_row(..=upper, terms);
        }
    }
}

/// The windows over which a minimum up or down time applies.
///
/// Full windows of length `min_time` are used wherever they fit inside the horizon; near the end
/// of the horizon the window is truncated, but only if `min_time >= 2` as shorter windows are
/// trivially satisfied.
fn windows(
    num_periods: usize,
    min_time: usize,
) -> impl Iterator<Item = (usize, std::ops::Range<usize>)> {
    (0..num_periods).filter_map(move |t| {
        let full = t + min_time <= num_periods;
        let wanted = if full { min_time >= 1 } else { min_time >= 2 };
        wanted.then(|| (t, t..num_periods.min(t + min_time)))
    })
}

impl ResourceModel for ThermalGenerator {
    fn validate(&self, num_periods: usize) -> Result<()> {
        ensure!(num_periods > 0, "Time horizon cannot be empty");
        ensure!(
            !self.max_production_block.is_empty(),
            "There must be at least one generation block"
        );
        ensure!(
            self.marginal_costs.len() == self.max_production_block.len(),
            "There must be one marginal cost per generation block"
        );
        for (name, value) in [
            ("no_load_cost", self.no_load_cost),
            ("startup_cost", self.startup_cost),
            ("shutdown_cost", self.shutdown_cost),
            ("ramp_up_rate", self.ramp_up_rate),
            ("ramp_down_rate", self.ramp_down_rate),
            ("min_stable_generation", self.min_stable_generation),
            ("initial_operating_state", self.initial_operating_state),
        ] {
            check_non_negative(value, name)?;
        }
        check_positive(self.max_production_limit, "max_production_limit")?;
        for block in &self.max_production_block {
            check_non_negative(*block, "max_production_block")?;
        }
        ensure!(
            self.min_stable_generation <= self.max_production_limit,
            "min_stable_generation cannot exceed max_production_limit"
        );
        ensure!(
            self.initial_off_hours == 0 || self.initial_on_hours == 0,
            "initial_off_hours and initial_on_hours cannot both be non-zero"
        );

        Ok(())
    }

    fn dispatch_bounds(&self) -> RangeInclusive<f64> {
        f64::NEG_INFINITY..=0.0
    }

    fn add_scenario_constraints(
        &self,
        problem: &mut Problem,
        dispatch: &[Variable],
        valuation: Variable,
    ) {
        self.add_unit_commitment(problem, dispatch, valuation);
    }
}

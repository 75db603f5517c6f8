//! A battery storage system.
use super::ResourceModel;
use crate::input::{check_non_negative, check_positive};
use crate::solver::{Problem, Variable};
use anyhow::{Result, ensure};
use serde::Deserialize;
use std::ops::RangeInclusive;

/// Parameters of a battery
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Battery {
    /// Maximum charging power
    pub max_charging: f64,
    /// Maximum discharging power
    pub max_discharging: f64,
    /// Fraction of charged power which is stored
    pub charging_efficiency: f64,
    /// Fraction of discharged energy which is delivered
    pub discharging_efficiency: f64,
    /// Minimum state of charge
    pub min_state_of_charge: f64,
    /// Maximum state of charge
    pub max_state_of_charge: f64,
    /// State of charge at the start (and end) of the day
    pub initial_state_of_charge: f64,
}

impl Default for Battery {
    fn default() -> Self {
        Self {
            max_charging: 10.0,
            max_discharging: 10.0,
            charging_efficiency: 0.9,
            discharging_efficiency: 0.9,
            min_state_of_charge: 0.0,
            max_state_of_charge: 20.0,
            initial_state_of_charge: 10.0,
        }
    }
}

/// Variables describing how a battery operates in one scenario
pub(crate) struct BatteryVariables {
    pub charge: Vec<Variable>,
    pub discharge: Vec<Variable>,
    pub state_of_charge: Vec<Variable>,
}

impl Battery {
    pub(crate) fn add_operation(
        &self,
        problem: &mut Problem,
        dispatch: &[Variable],
        valuation: Variable,
    ) -> BatteryVariables {
        let mut vars = BatteryVariables {
            charge: Vec::with_capacity(dispatch.len()),
            discharge: Vec::with_capacity(dispatch.len()),
            state_of_charge: Vec::with_capacity(dispatch.len()),
        };

        for x in dispatch {
            let g = problem.add_column(0.0, 0.0..=self.max_charging);
            let d = problem.add_column(0.0, 0.0..=self.max_discharging);
            let e = problem.add_column(0.0, self.min_state_of_charge..=self.max_state_of_charge);
            let charging = problem.add_binary(0.0);

            // x̃ = g - d
            problem.add_row(0.0..=0.0, [(*x, 1.0), (g, -1.0), (d, 1.0)]);

            // e[t] = e[t-1] + η_c * g - d / η_d
            let mut terms = vec![
                (e, 1.0),
                (g, -self.charging_efficiency),
                (d, 1.0 / self.discharging_efficiency),
            ];
            let rhs = match vars.state_of_charge.last() {
                Some(prev) => {
                    terms.push((*prev, -1.0));
                    0.0
                }
                None => self.initial_state_of_charge,
            };
            problem.add_row(rhs..=rhs, terms);

            // No simultaneous charging and discharging
            problem.add_row(..=0.0, [(g, 1.0), (charging, -self.max_charging)]);
            problem.add_row(..=self.max_discharging, [
                (d, 1.0),
                (charging, self.max_discharging),
            ]);

            vars.charge.push(g);
            vars.discharge.push(d);
            vars.state_of_charge.push(e);
        }

        if let Some(last) = vars.state_of_charge.last() {
            problem.fix(*last, self.initial_state_of_charge);
        }
        problem.fix(valuation, 0.0);

        vars
    }
}

impl ResourceModel for Battery {
    fn validate(&self, num_periods: usize) -> Result<()> {
        ensure!(num_periods > 0, "Time horizon cannot be empty");
        check_non_negative(self.max_charging, "max_charging")?;
        check_non_negative(self.max_discharging, "max_discharging")?;
        for (name, value) in [
            ("charging_efficiency", self.charging_efficiency),
            ("discharging_efficiency", self.discharging_efficiency),
        ] {
            check_positive(value, name)?;
            ensure!(value <= 1.0, "{name} cannot be greater than one");
        }
        ensure!(
            self.min_state_of_charge <= self.initial_state_of_charge
                && self.initial_state_of_charge <= self.max_state_of_charge,
            "initial_state_of_charge must lie between min_state_of_charge and max_state_of_charge"
        );

        Ok(())
    }

    fn dispatch_bounds(&self) -> RangeInclusive<f64> {
        f64::NEG_INFINITY..=f64::INFINITY
    }

    fn add_scenario_constraints(
        &self,
        problem: &mut Problem,
        dispatch: &[Variable],
        valuation: Variable,
    ) {
        self.add_operation(problem, dispatch, valuation);
    }
}

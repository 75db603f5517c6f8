//! A utility serving a heat load, which buys electricity for a heat pump.
//!
//! The load can also be served from a gas boiler or from heat storage, or curtailed. The
//! valuation is the revenue from the load served, less the cost of gas and a fixed daily cost.
use super::ResourceModel;
use crate::input::{check_non_negative, check_positive};
use crate::solver::{Problem, Variable};
use anyhow::{Result, ensure};
use itertools::Itertools;
use serde::Deserialize;
use std::ops::RangeInclusive;

/// Parameters of a heat-serving utility
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemandResponse {
    /// Heat produced per unit of electricity consumed
    pub heat_pump_efficiency: f64,
    /// Heat produced per unit of gas consumed
    pub gas_boiler_efficiency: f64,
    /// Fraction of stored heat lost each period
    pub loss_coefficient: f64,
    /// Heat load in each period
    pub heat_load: Vec<f64>,
    /// Cost per unit of gas
    pub gas_cost: f64,
    /// Price paid by consumers per unit of heat served
    pub load_serving_price: f64,
    /// Capacity of the heat storage
    pub storage_capacity: f64,
    /// Maximum rate of charging the heat storage
    pub max_charging_storage: f64,
    /// Maximum rate of discharging the heat storage
    pub max_discharging_storage: f64,
    /// Maximum electricity consumption of the heat pump
    pub heat_pump_capacity: f64,
    /// Maximum gas consumption of the boiler
    pub gas_boiler_capacity: f64,
    /// Heat in storage at the start (and end) of the day
    pub initial_state_of_charge: f64,
    /// Fixed cost of operating for a day
    pub daily_fixed_cost: f64,
}

impl Default for DemandResponse {
    fn default() -> Self {
        Self {
            heat_pump_efficiency: 1.0,
            gas_boiler_efficiency: 0.9,
            loss_coefficient: 0.01,
            heat_load: vec![
                19.0, 20.0, 20.0, 21.0, 24.0, 32.0, 38.0, 36.0, 36.0, 35.0, 33.0, 32.0, 31.0, 31.0,
                31.0, 32.0, 33.0, 33.0, 33.0, 33.0, 32.0, 29.0, 23.0, 20.0,
            ],
            gas_cost: 20.0,
            load_serving_price: 40.0,
            storage_capacity: 40.0,
            max_charging_storage: 20.0,
            max_discharging_storage: 20.0,
            heat_pump_capacity: 30.0,
            gas_boiler_capacity: 10.0,
            initial_state_of_charge: 0.0,
            daily_fixed_cost: 0.0,
        }
    }
}

/// Variables describing how the utility operates in one scenario
pub(crate) struct DemandResponseVariables {
    pub gas: Vec<Variable>,
    pub curtailment: Vec<Variable>,
    pub state_of_charge: Vec<Variable>,
}

impl DemandResponse {
    pub(crate) fn add_operation(
        &self,
        problem: &mut Problem,
        dispatch: &[Variable],
        valuation: Variable,
    ) -> DemandResponseVariables {
        let retention = 1.0 - self.loss_coefficient;
        let mut vars = DemandResponseVariables {
            gas: Vec::with_capacity(dispatch.len()),
            curtailment: Vec::with_capacity(dispatch.len()),
            state_of_charge: Vec::with_capacity(dispatch.len()),
        };

        // v + Σ_t (serving_price * z + gas_cost * y) = Σ_t serving_price * load - fixed cost
        let mut valuation_terms = vec![(valuation, 1.0)];
        for (x, load) in dispatch.iter().zip_eq(&self.heat_load) {
            let y = problem.add_column(0.0, 0.0..=self.gas_boiler_capacity);
            let g = problem.add_column(0.0, 0.0..=self.max_charging_storage);
            let d = problem.add_column(0.0, 0.0..=self.max_discharging_storage);
            let e = problem.add_column(0.0, 0.0..=self.storage_capacity);
            let z = problem.add_column(0.0, 0.0..=*load);

            // Heat balance: η_hp * x̃ + η_gb * y + d - g = load - z
            problem.add_row(*load..=*load, [
                (*x, self.heat_pump_efficiency),
                (y, self.gas_boiler_efficiency),
                (d, 1.0),
                (g, -1.0),
                (z, 1.0),
            ]);

            // e[t] = (1 - loss) * e[t-1] + g - d
            let mut terms = vec![(e, 1.0), (g, -1.0), (d, 1.0)];
            let rhs = match vars.state_of_charge.last() {
                Some(prev) => {
                    terms.push((*prev, -retention));
                    0.0
                }
                None => retention * self.initial_state_of_charge,
            };
            problem.add_row(rhs..=rhs, terms);

            valuation_terms.extend([(z, self.load_serving_price), (y, self.gas_cost)]);
            vars.gas.push(y);
            vars.curtailment.push(z);
            vars.state_of_charge.push(e);
        }

        if let Some(last) = vars.state_of_charge.last() {
            problem.fix(*last, self.initial_state_of_charge);
        }

        let revenue = self.load_serving_price * self.heat_load.iter().sum::<f64>();
        let rhs = revenue - self.daily_fixed_cost;
        problem.add_row(rhs..=rhs, valuation_terms);

        vars
    }
}

impl ResourceModel for DemandResponse {
    fn validate(&self, num_periods: usize) -> Result<()> {
        ensure!(num_periods > 0, "Time horizon cannot be empty");
        ensure!(
            self.heat_load.len() == num_periods,
            "Heat load covers {} periods but the time horizon has {num_periods}",
            self.heat_load.len()
        );
        for load in &self.heat_load {
            check_non_negative(*load, "heat_load")?;
        }
        check_positive(self.heat_pump_efficiency, "heat_pump_efficiency")?;
        check_positive(self.gas_boiler_efficiency, "gas_boiler_efficiency")?;
        ensure!(
            (0.0..1.0).contains(&self.loss_coefficient),
            "loss_coefficient must be at least zero and less than one"
        );
        for (name, value) in [
            ("gas_cost", self.gas_cost),
            ("load_serving_price", self.load_serving_price),
            ("storage_capacity", self.storage_capacity),
            ("max_charging_storage", self.max_charging_storage),
            ("max_discharging_storage", self.max_discharging_storage),
            ("heat_pump_capacity", self.heat_pump_capacity),
            ("gas_boiler_capacity", self.gas_boiler_capacity),
            ("daily_fixed_cost", self.daily_fixed_cost),
        ] {
            check_non_negative(value, name)?;
        }
        ensure!(
            (0.0..=self.storage_capacity).contains(&self.initial_state_of_charge),
            "initial_state_of_charge must lie between zero and storage_capacity"
        );

        Ok(())
    }

    fn dispatch_bounds(&self) -> RangeInclusive<f64> {
        0.0..=self.heat_pump_capacity
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

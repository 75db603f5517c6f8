//! Models of the energy resources which submit bids.
//!
//! Each technology describes, for a single price scenario, the set of feasible dispatches and the
//! valuation of each dispatch. [`build`] stacks one independent copy of this model per scenario
//! into a problem which maximises the expected profit
//! `Σ_s prob[s] * (v[s] - Σ_t price[s][t] * x̃[s][t])`.
//!
//! Dispatch follows the market convention: negative quantities are sold, positive ones bought.
use crate::scenario::{PricePath, ScenarioSet};
use crate::solver::{Problem, Sense, SolveStatus, SolverOptions, Variable};
use anyhow::{Context, Result, ensure};
use itertools::Itertools;
use log::warn;
use std::error::Error;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;
use strum::{Display, EnumIter, IntoEnumIterator};

pub mod battery;
pub mod demand_response;
pub mod thermal;
pub use battery::Battery;
pub use demand_response::DemandResponse;
pub use thermal::ThermalGenerator;

/// The kinds of resource which can be modelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, serde::Deserialize)]
#[serde(try_from = "String")]
pub enum Technology {
    /// A thermal generator with unit commitment
    #[strum(serialize = "thermal generator")]
    ThermalGenerator,
    /// A battery storage system
    #[strum(serialize = "battery")]
    Battery,
    /// A utility serving a heat load with a heat pump, a gas boiler and heat storage
    #[strum(serialize = "demand response")]
    DemandResponse,
}

impl FromStr for Technology {
    type Err = UnknownCaseStudy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Technology::iter()
            .find(|technology| technology.to_string() == s)
            .ok_or_else(|| UnknownCaseStudy(s.to_string()))
    }
}

impl TryFrom<String> for Technology {
    type Error = UnknownCaseStudy;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Indicates that a technology name did not match any known technology
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownCaseStudy(pub String);

impl fmt::Display for UnknownCaseStudy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let known = Technology::iter().map(|t| format!("\"{t}\"")).join(", ");
        write!(f, "Unknown case study \"{}\" (expected one of {known})", self.0)
    }
}

impl Error for UnknownCaseStudy {}

/// Which way power may flow between a resource and the market
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The resource can only sell (dispatch is never positive)
    Sell,
    /// The resource can only buy (dispatch is never negative)
    Buy,
    /// The resource can buy or sell
    Both,
}

impl Direction {
    /// Work out the direction from the bounds on dispatch
    pub fn from_bounds(bounds: &RangeInclusive<f64>) -> Self {
        if *bounds.end() <= 0.0 {
            Self::Sell
        } else if *bounds.start() >= 0.0 {
            Self::Buy
        } else {
            Self::Both
        }
    }

    /// Bounds for a bid quantity in a single period, given the largest allowed quantity
    pub fn quantity_bounds(self, max_quantity: f64) -> RangeInclusive<f64> {
        match self {
            Self::Sell => -max_quantity..=0.0,
            Self::Buy => 0.0..=max_quantity,
            Self::Both => -max_quantity..=max_quantity,
        }
    }
}

/// The feasible set and valuation of a technology in a single price scenario
pub trait ResourceModel {
    /// Check that the parameters are usable over a horizon of `num_periods`
    fn validate(&self, num_periods: usize) -> Result<()>;

    /// Bounds on the dispatch in every period
    fn dispatch_bounds(&self) -> RangeInclusive<f64>;

    /// Which way power may flow
    fn direction(&self) -> Direction {
        Direction::from_bounds(&self.dispatch_bounds())
    }

    /// Add the constraints of one scenario, linking `dispatch` and `valuation` to the
    /// technology's internal variables
    fn add_scenario_constraints(
        &self,
        problem: &mut Problem,
        dispatch: &[Variable],
        valuation: Variable,
    );
}

/// The parameters of a resource, for any technology
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceParameters {
    /// A thermal generator
    ThermalGenerator(ThermalGenerator),
    /// A battery
    Battery(Battery),
    /// A heat-serving utility
    DemandResponse(DemandResponse),
}

impl ResourceParameters {
    /// The case data used when no parameters are given
    pub fn default_for(technology: Technology) -> Self {
        match technology {
            Technology::ThermalGenerator => Self::ThermalGenerator(ThermalGenerator::default()),
            Technology::Battery => Self::Battery(Battery::default()),
            Technology::DemandResponse => Self::DemandResponse(DemandResponse::default()),
        }
    }

    /// Parameters for `technology`, with the default case data overridden by `overrides`
    pub fn with_overrides(technology: Technology, overrides: toml::Table) -> Result<Self> {
        let value = toml::Value::Table(overrides);
        let parameters = match technology {
            Technology::ThermalGenerator => Self::ThermalGenerator(value.try_into()?),
            Technology::Battery => Self::Battery(value.try_into()?),
            Technology::DemandResponse => Self::DemandResponse(value.try_into()?),
        };

        Ok(parameters)
    }

    /// The technology these parameters describe
    pub fn technology(&self) -> Technology {
        match self {
            Self::ThermalGenerator(_) => Technology::ThermalGenerator,
            Self::Battery(_) => Technology::Battery,
            Self::DemandResponse(_) => Technology::DemandResponse,
        }
    }

    /// The model of the technology
    pub fn model(&self) -> &dyn ResourceModel {
        match self {
            Self::ThermalGenerator(params) => params,
            Self::Battery(params) => params,
            Self::DemandResponse(params) => params,
        }
    }
}

/// Handles to the market-facing variables of a [`ResourceProblem`]
#[derive(Debug, Clone)]
pub struct ResourceVariables {
    /// Dispatch `x̃[s][t]` for every scenario and period
    pub dispatch: Vec<Vec<Variable>>,
    /// Valuation `v[s]` for every scenario
    pub valuation: Vec<Variable>,
}

/// The resource model over a set of scenarios, ready to be solved or extended
pub struct ResourceProblem {
    /// The underlying optimisation problem
    pub problem: Problem,
    /// The market-facing variables
    pub variables: ResourceVariables,
}

/// The per-scenario results of solving a [`ResourceProblem`]
#[derive(Debug, Clone)]
pub struct SolvedResource {
    /// The optimal dispatch for each scenario
    pub bundles: Vec<PricePath>,
    /// The valuation of each scenario's dispatch
    pub valuations: Vec<f64>,
    /// Expected profit
    pub objective: f64,
    /// How the solve terminated
    pub status: SolveStatus,
    /// Time taken by the solver
    pub runtime: Duration,
}

/// Build the resource model for the given scenarios.
///
/// The objective is expected profit. Scenarios are independent copies of the feasible set; later
/// formulations add the constraints which couple them.
pub fn build(parameters: &ResourceParameters, scenarios: &ScenarioSet) -> Result<ResourceProblem> {
    let model = parameters.model();
    model
        .validate(scenarios.num_periods())
        .with_context(|| format!("Invalid parameters for {}", parameters.technology()))?;

    let mut problem = Problem::default();
    let mut variables = ResourceVariables {
        dispatch: Vec::with_capacity(scenarios.len()),
        valuation: Vec::with_capacity(scenarios.len()),
    };
    for (prices, probability) in scenarios.iter() {
        let dispatch = prices
            .iter()
            .map(|price| problem.add_column(-probability * price, model.dispatch_bounds()))
            .collect_vec();
        let valuation = problem.add_column(probability, f64::NEG_INFINITY..=f64::INFINITY);
        model.add_scenario_constraints(&mut problem, &dispatch, valuation);

        variables.dispatch.push(dispatch);
        variables.valuation.push(valuation);
    }

    Ok(ResourceProblem { problem, variables })
}

impl ResourceProblem {
    /// Solve the problem and read out the dispatch and valuation of every scenario.
    ///
    /// Returns `None` if the problem is infeasible.
    pub fn solve(self, options: &SolverOptions) -> Result<Option<SolvedResource>> {
        let Self { problem, variables } = self;
        let Some(solution) = problem.solve(Sense::Maximise, options)?.solution() else {
            return Ok(None);
        };

        Ok(Some(SolvedResource {
            bundles: variables
                .dispatch
                .iter()
                .map(|dispatch| solution.values(dispatch))
                .collect(),
            valuations: solution.values(&variables.valuation),
            objective: solution.objective,
            status: solution.status,
            runtime: solution.runtime,
        }))
    }
}

/// Solve the resource model for the given scenarios, failing if it is infeasible
pub fn solve_scenarios(
    parameters: &ResourceParameters,
    scenarios: &ScenarioSet,
    options: &SolverOptions,
) -> Result<SolvedResource> {
    build(parameters, scenarios)?
        .solve(options)?
        .with_context(|| format!("No solution found for {} model", parameters.technology()))
}

/// The realized utility of trading `bundle` at `price`.
///
/// The resource model is solved for the single price path with the dispatch fixed to `bundle`.
/// Returns `None` (and logs a warning) if the bundle is physically infeasible.
pub fn fixed_dispatch_utility(
    parameters: &ResourceParameters,
    price: &[f64],
    bundle: &[f64],
    options: &SolverOptions,
) -> Result<Option<f64>> {
    ensure!(
        bundle.len() == price.len(),
        "Bundle covers {} periods but price covers {}",
        bundle.len(),
        price.len()
    );
    let scenarios = ScenarioSet::degenerate(price)?;
    let ResourceProblem {
        mut problem,
        variables,
    } = build(parameters, &scenarios)?;
    for (var, quantity) in variables.dispatch[0].iter().zip_eq(bundle) {
        problem.fix(*var, *quantity);
    }

    match problem.solve(Sense::Maximise, options)?.solution() {
        Some(solution) => Ok(Some(solution.objective)),
        None => {
            warn!(
                "Bundle is infeasible for {}: no utility can be computed",
                parameters.technology()
            );
            Ok(None)
        }
    }
}

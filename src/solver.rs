//! A thin layer over the HiGHS solver.
//!
//! All of the mathematical programs in this crate are built through [`Problem`], which hands out
//! typed [`Variable`] handles rather than relying on variable names. Solver parameters are passed
//! explicitly for each solve with [`SolverOptions`].
use anyhow::{Result, anyhow, bail, ensure};
use highs::{HighsModelStatus, RowProblem};
use indexmap::IndexMap;
use itertools::Itertools;
use log::warn;
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};
use std::ops::RangeBounds;
use std::time::{Duration, Instant};

pub use highs::Sense;

/// A decision variable in an optimisation problem.
///
/// Note that this type does **not** include the value of the variable; it just refers to a
/// particular column of the problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Variable(usize);

/// Options passed to the solver for a single solve
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SolverOptions {
    /// Whether to print the solver's own log output to the console
    pub verbose: bool,
    /// Wall-clock limit for the solve. The best incumbent is returned when it expires.
    pub time_limit: Option<Duration>,
    /// Solve LPs with the simplex method, so that solutions are vertices
    pub simplex: bool,
}

impl SolverOptions {
    /// A copy of these options which solves LPs with the simplex method
    pub fn using_simplex(&self) -> Self {
        Self {
            simplex: true,
            ..self.clone()
        }
    }

    /// A copy of these options with `elapsed` taken off the time limit
    pub fn remaining(&self, elapsed: Duration) -> Self {
        Self {
            time_limit: self
                .time_limit
                .map(|limit| limit.saturating_sub(elapsed)),
            ..self.clone()
        }
    }
}

/// How a solve which produced a solution terminated
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, SerializeLabeledStringEnum, DeserializeLabeledStringEnum,
)]
pub enum SolveStatus {
    /// The solution is optimal (within the solver's tolerances)
    #[string = "optimal"]
    Optimal,
    /// The time limit expired and the best incumbent was returned
    #[string = "time_limit"]
    TimeLimit,
    /// Some other limit (e.g. on nodes or iterations) was hit and the incumbent was returned
    #[string = "other_limit"]
    OtherLimit,
}

impl SolveStatus {
    /// Whether the solution is known to be optimal
    pub fn is_optimal(self) -> bool {
        self == Self::Optimal
    }

    /// The less exact of two statuses, used when a result depends on several solves
    pub fn worst(self, other: Self) -> Self {
        if self.is_optimal() { other } else { self }
    }
}

/// A solution to an optimisation problem
#[derive(Debug, Clone)]
pub struct Solution {
    values: Vec<f64>,
    /// The value of the objective function
    pub objective: f64,
    /// How the solve terminated
    pub status: SolveStatus,
    /// Wall-clock time taken by the solver
    pub runtime: Duration,
}

impl Solution {
    /// The value of the given variable in this solution
    pub fn value(&self, var: Variable) -> f64 {
        self.values[var.0]
    }

    /// The values of the given variables, in order
    pub fn values<'a, I>(&self, vars: I) -> Vec<f64>
    where
        I: IntoIterator<Item = &'a Variable>,
    {
        vars.into_iter().map(|var| self.value(*var)).collect()
    }

    /// The value of every column, in the order the columns were added
    pub fn columns(&self) -> &[f64] {
        &self.values
    }
}

/// The result of attempting to solve a problem
#[derive(Debug)]
pub enum SolveOutcome {
    /// A feasible (possibly non-optimal) solution was found
    Solved(Solution),
    /// The problem has no feasible solution
    Infeasible {
        /// Wall-clock time taken by the solver
        runtime: Duration,
    },
}

impl SolveOutcome {
    /// The solution, if there is one
    pub fn solution(self) -> Option<Solution> {
        match self {
            Self::Solved(solution) => Some(solution),
            Self::Infeasible { .. } => None,
        }
    }

    /// The solution, treating infeasibility as an error
    pub fn into_solution(self, problem_name: &str) -> Result<Solution> {
        self.solution()
            .ok_or_else(|| anyhow!("No solution found for {problem_name}: problem is infeasible"))
    }
}

/// An optimisation problem under construction
#[derive(Default)]
pub struct Problem {
    inner: RowProblem,
    columns: Vec<highs::Col>,
}

impl Problem {
    /// Add a continuous variable with the given objective coefficient and bounds
    pub fn add_column<B: RangeBounds<f64>>(&mut self, cost: f64, bounds: B) -> Variable {
        let col = self.inner.add_column(cost, bounds);
        self.push_column(col)
    }

    /// Add a binary variable with the given objective coefficient
    pub fn add_binary(&mut self, cost: f64) -> Variable {
        let col = self.inner.add_integer_column(cost, 0.0..=1.0);
        self.push_column(col)
    }

    fn push_column(&mut self, col: highs::Col) -> Variable {
        self.columns.push(col);
        Variable(self.columns.len() - 1)
    }

    /// Add a constraint `bounds.start <= Σ coeff * var <= bounds.end`.
    ///
    /// Repeated variables have their coefficients summed. Rows without any terms are skipped.
    pub fn add_row<B, I>(&mut self, bounds: B, terms: I)
    where
        B: RangeBounds<f64>,
        I: IntoIterator<Item = (Variable, f64)>,
    {
        let mut merged: IndexMap<usize, f64> = IndexMap::new();
        for (var, coeff) in terms {
            *merged.entry(var.0).or_default() += coeff;
        }
        if merged.is_empty() {
            return;
        }

        let terms = merged
            .into_iter()
            .map(|(index, coeff)| (self.columns[index], coeff))
            .collect_vec();
        self.inner.add_row(bounds, terms);
    }

    /// Add the constraint `var == value`
    pub fn fix(&mut self, var: Variable, value: f64) {
        self.add_row(value..=value, [(var, 1.0)]);
    }

    /// The number of variables in the problem
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Solve the problem
    pub fn solve(self, sense: Sense, options: &SolverOptions) -> Result<SolveOutcome> {
        self.solve_impl(sense, options, None)
    }

    /// Solve the problem, seeding the solver with a starting point for every column
    pub fn solve_with_start(
        self,
        sense: Sense,
        options: &SolverOptions,
        start: &[f64],
    ) -> Result<SolveOutcome> {
        ensure!(
            start.len() == self.num_columns(),
            "Warm start has {} values but problem has {} columns",
            start.len(),
            self.num_columns()
        );
        self.solve_impl(sense, options, Some(start))
    }

    fn solve_impl(
        self,
        sense: Sense,
        options: &SolverOptions,
        start: Option<&[f64]>,
    ) -> Result<SolveOutcome> {
        let num_columns = self.num_columns();
        let mut model = self.inner.optimise(sense);
        apply_options(&mut model, options);
        if let Some(start) = start {
            model
                .try_set_solution(Some(start), None, None, None)
                .map_err(|status| anyhow!("Could not set warm start: {status:?}"))?;
        }

        let start_time = Instant::now();
        let solved = model
            .try_solve()
            .map_err(|status| anyhow!("Could not solve: {status:?}"))?;
        let runtime = start_time.elapsed();

        let status = match solved.status() {
            HighsModelStatus::Optimal => SolveStatus::Optimal,
            HighsModelStatus::Infeasible | HighsModelStatus::UnboundedOrInfeasible => {
                return Ok(SolveOutcome::Infeasible { runtime });
            }
            HighsModelStatus::Unbounded => bail!("Could not solve: problem is unbounded"),
            HighsModelStatus::ReachedTimeLimit => SolveStatus::TimeLimit,
            status => {
                // Other limits leave an incumbent only if the solver found one
                if !solved.objective_value().is_finite() {
                    bail!("Could not solve: {status:?}");
                }
                SolveStatus::OtherLimit
            }
        };

        let objective = solved.objective_value();
        ensure!(
            objective.is_finite(),
            "Solver stopped ({status:?}) before finding a feasible solution"
        );
        if !status.is_optimal() {
            warn!(
                "Solver stopped early ({status:?}) after {:.2}s; using best incumbent",
                runtime.as_secs_f64()
            );
        }

        let values = solved.get_solution().columns().to_vec();
        ensure!(
            values.len() == num_columns,
            "Solver returned {} values for {num_columns} columns",
            values.len()
        );

        Ok(SolveOutcome::Solved(Solution {
            values,
            objective,
            status,
            runtime,
        }))
    }
}

/// Apply per-solve options to the HiGHS model
fn apply_options(model: &mut highs::Model, options: &SolverOptions) {
    model.set_option("output_flag", options.verbose);
    model.set_option("log_to_console", options.verbose);
    if let Some(time_limit) = options.time_limit {
        model.set_option("time_limit", time_limit.as_secs_f64());
    }
    if options.simplex {
        model.set_option("solver", "simplex");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn test_solve_lp() {
        // max x + y s.t. x + 2y <= 4, 3x + y <= 6
        let mut problem = Problem::default();
        let x = problem.add_column(1.0, 0.0..);
        let y = problem.add_column(1.0, 0.0..);
        problem.add_row(..=4.0, [(x, 1.0), (y, 2.0)]);
        problem.add_row(..=6.0, [(x, 3.0), (y, 1.0)]);

        let solution = problem
            .solve(Sense::Maximise, &SolverOptions::default())
            .unwrap()
            .into_solution("test")
            .unwrap();
        assert!(solution.status.is_optimal());
        assert_approx_eq!(f64, solution.value(x), 1.6, epsilon = 1e-6);
        assert_approx_eq!(f64, solution.value(y), 1.2, epsilon = 1e-6);
        assert_approx_eq!(f64, solution.objective, 2.8, epsilon = 1e-6);
    }

    #[test]
    fn test_solve_binary() {
        let mut problem = Problem::default();
        let a = problem.add_binary(3.0);
        let b = problem.add_binary(2.0);
        problem.add_row(..=1.0, [(a, 1.0), (b, 1.0)]);

        let solution = problem
            .solve(Sense::Maximise, &SolverOptions::default())
            .unwrap()
            .into_solution("test")
            .unwrap();
        assert_approx_eq!(f64, solution.value(a), 1.0, epsilon = 1e-6);
        assert_approx_eq!(f64, solution.value(b), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_solve_infeasible() {
        let mut problem = Problem::default();
        let x = problem.add_column(1.0, 0.0..=1.0);
        problem.fix(x, 2.0);

        let outcome = problem
            .solve(Sense::Maximise, &SolverOptions::default())
            .unwrap();
        assert!(outcome.solution().is_none());
    }

    #[test]
    fn test_empty_rows_skipped() {
        let mut problem = Problem::default();
        let x = problem.add_column(1.0, 0.0..=1.0);
        problem.add_row(5.0..=5.0, []);

        let solution = problem
            .solve(Sense::Maximise, &SolverOptions::default())
            .unwrap()
            .into_solution("test")
            .unwrap();
        assert_approx_eq!(f64, solution.value(x), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_repeated_terms_merged() {
        // x + x <= 1 is the same as 2x <= 1
        let mut problem = Problem::default();
        let x = problem.add_column(1.0, 0.0..=1.0);
        problem.add_row(..=1.0, [(x, 1.0), (x, 1.0)]);

        let solution = problem
            .solve(Sense::Maximise, &SolverOptions::default())
            .unwrap()
            .into_solution("test")
            .unwrap();
        assert_approx_eq!(f64, solution.value(x), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_warm_start_wrong_length() {
        let mut problem = Problem::default();
        problem.add_column(1.0, 0.0..=1.0);
        assert!(
            problem
                .solve_with_start(Sense::Maximise, &SolverOptions::default(), &[])
                .is_err()
        );
    }

    #[test]
    fn test_remaining_time() {
        let options = SolverOptions {
            time_limit: Some(Duration::from_secs(10)),
            ..SolverOptions::default()
        };
        assert_eq!(
            options.remaining(Duration::from_secs(4)).time_limit,
            Some(Duration::from_secs(6))
        );
        assert_eq!(
            options.remaining(Duration::from_secs(12)).time_limit,
            Some(Duration::ZERO)
        );
        assert_eq!(
            SolverOptions::default()
                .remaining(Duration::from_secs(4))
                .time_limit,
            None
        );
    }

    #[test]
    fn test_solve_status_worst() {
        assert_eq!(
            SolveStatus::Optimal.worst(SolveStatus::TimeLimit),
            SolveStatus::TimeLimit
        );
        assert_eq!(
            SolveStatus::TimeLimit.worst(SolveStatus::Optimal),
            SolveStatus::TimeLimit
        );
    }
}

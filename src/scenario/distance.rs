//! The Wasserstein (earth mover's) distance between discrete price distributions.
use super::ScenarioSet;
use crate::solver::{Problem, Sense, SolverOptions};
use anyhow::{Result, ensure};
use itertools::{Itertools, iproduct};

/// Compute the 1-Wasserstein distance between two scenario sets.
///
/// The ground metric is the Euclidean distance between price paths. The distance is the optimal
/// value of the transportation problem moving the probability mass of `p` onto that of `q`.
pub fn wasserstein_distance(p: &ScenarioSet, q: &ScenarioSet) -> Result<f64> {
    ensure!(
        p.num_periods() == q.num_periods(),
        "Cannot compare distributions over {} and {} periods",
        p.num_periods(),
        q.num_periods()
    );

    let mut problem = Problem::default();
    let flows = iproduct!(0..p.len(), 0..q.len())
        .map(|(i, j)| {
            let cost = euclidean_distance(p.prices(i), q.prices(j));
            problem.add_column(cost, 0.0..)
        })
        .collect_vec();

    // Each row of the flow matrix carries the mass of one scenario of `p`...
    for (i, prob) in p.probabilities().iter().enumerate() {
        let terms = (0..q.len()).map(|j| (flows[i * q.len() + j], 1.0));
        problem.add_row(*prob..=*prob, terms);
    }
    // ...and each column delivers the mass of one scenario of `q`
    for (j, prob) in q.probabilities().iter().enumerate() {
        let terms = (0..p.len()).map(|i| (flows[i * q.len() + j], 1.0));
        problem.add_row(*prob..=*prob, terms);
    }

    let solution = problem
        .solve(Sense::Minimise, &SolverOptions::default())?
        .into_solution("transportation problem")?;

    // Guard against tiny negative values from solver tolerances
    Ok(solution.objective.max(0.0))
}

fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip_eq(b)
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    fn two_point() -> ScenarioSet {
        ScenarioSet::new(vec![vec![0.0, 0.0], vec![3.0, 4.0]], vec![0.5, 0.5]).unwrap()
    }

    #[test]
    fn test_euclidean_distance() {
        assert_approx_eq!(f64, euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
    }

    #[test]
    fn test_wasserstein_identity() {
        let p = two_point();
        assert_approx_eq!(f64, wasserstein_distance(&p, &p).unwrap(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_wasserstein_symmetry() {
        let p = two_point();
        let q = ScenarioSet::new(vec![vec![1.0, 1.0], vec![6.0, 8.0], vec![0.0, 0.0]], vec![
            0.2, 0.3, 0.5,
        ])
        .unwrap();
        assert_approx_eq!(
            f64,
            wasserstein_distance(&p, &q).unwrap(),
            wasserstein_distance(&q, &p).unwrap(),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_wasserstein_degenerate() {
        // All mass of `p` must move to the single point of `q`
        let p = two_point();
        let q = ScenarioSet::degenerate(&[0.0, 0.0]).unwrap();
        assert_approx_eq!(f64, wasserstein_distance(&p, &q).unwrap(), 2.5, epsilon = 1e-6);
    }

    #[test]
    fn test_wasserstein_mismatched_periods() {
        let p = two_point();
        let q = ScenarioSet::degenerate(&[0.0]).unwrap();
        assert!(wasserstein_distance(&p, &q).is_err());
    }
}

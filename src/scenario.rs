//! Price scenarios describing uncertainty about the day-ahead price.
use anyhow::{Result, ensure};
use float_cmp::approx_eq;
use itertools::Itertools;

pub mod distance;
pub mod generation;
pub use distance::wasserstein_distance;
pub use generation::{generate_scenarios, generate_scenarios_improved};

/// A price for every period of the time horizon
pub type PricePath = Vec<f64>;

/// Tolerance used when checking that probabilities sum to one
const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// A set of weighted price scenarios over a common time horizon
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioSet {
    prices: Vec<PricePath>,
    probabilities: Vec<f64>,
}

impl ScenarioSet {
    /// Create a new [`ScenarioSet`].
    ///
    /// There must be at least one scenario, every price path must cover the same non-empty
    /// horizon and the probabilities must be non-negative and sum to one.
    pub fn new(prices: Vec<PricePath>, probabilities: Vec<f64>) -> Result<Self> {
        ensure!(!prices.is_empty(), "Scenario set cannot be empty");
        ensure!(
            prices.len() == probabilities.len(),
            "Got {} price paths but {} probabilities",
            prices.len(),
            probabilities.len()
        );

        let num_periods = prices[0].len();
        ensure!(num_periods > 0, "Price paths cannot be empty");
        ensure!(
            prices.iter().all(|path| path.len() == num_periods),
            "All price paths must have the same length"
        );
        ensure!(
            prices.iter().flatten().all(|price| price.is_finite()),
            "Prices must be finite"
        );
        ensure!(
            probabilities.iter().all(|&prob| prob >= 0.0),
            "Probabilities cannot be negative"
        );
        let total: f64 = probabilities.iter().sum();
        ensure!(
            approx_eq!(f64, total, 1.0, epsilon = PROBABILITY_TOLERANCE),
            "Probabilities must sum to one (got {total})"
        );

        Ok(Self {
            prices,
            probabilities,
        })
    }

    /// Create a [`ScenarioSet`] in which every scenario is equally likely
    pub fn uniform(prices: Vec<PricePath>) -> Result<Self> {
        let probability = 1.0 / prices.len().max(1) as f64;
        let probabilities = vec![probability; prices.len()];
        Self::new(prices, probabilities)
    }

    /// The degenerate distribution putting all probability on a single price path
    pub fn degenerate(price: &[f64]) -> Result<Self> {
        Self::new(vec![price.to_vec()], vec![1.0])
    }

    /// The number of scenarios
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    /// Whether there are no scenarios (never true for a validated set)
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// The number of periods in the time horizon
    pub fn num_periods(&self) -> usize {
        self.prices[0].len()
    }

    /// The price path of the given scenario
    pub fn prices(&self, scenario: usize) -> &[f64] {
        &self.prices[scenario]
    }

    /// The probability of the given scenario
    pub fn probability(&self, scenario: usize) -> f64 {
        self.probabilities[scenario]
    }

    /// All probabilities
    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    /// Iterate over `(price path, probability)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&[f64], f64)> {
        self.prices
            .iter()
            .map(Vec::as_slice)
            .zip_eq(self.probabilities.iter().copied())
    }

    /// The largest absolute price in any scenario
    pub fn max_abs_price(&self) -> f64 {
        self.prices
            .iter()
            .flatten()
            .map(|price| price.abs())
            .fold(0.0, f64::max)
    }
}

/// The cost of buying `quantity` at `prices` (negative quantities are sales)
pub fn payment(prices: &[f64], quantity: &[f64]) -> f64 {
    prices
        .iter()
        .zip_eq(quantity)
        .map(|(price, quantity)| price * quantity)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::assert_error;
    use float_cmp::assert_approx_eq;

    #[test]
    fn test_scenario_set_new() {
        let set = ScenarioSet::new(vec![vec![1.0, 2.0], vec![3.0, 4.0]], vec![0.25, 0.75]).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.num_periods(), 2);
        assert_eq!(set.prices(1), &[3.0, 4.0]);
        assert_approx_eq!(f64, set.probability(0), 0.25);
        assert_approx_eq!(f64, set.max_abs_price(), 4.0);
    }

    #[test]
    fn test_scenario_set_invalid() {
        assert_error!(
            ScenarioSet::new(vec![], vec![]),
            "Scenario set cannot be empty"
        );
        assert_error!(
            ScenarioSet::new(vec![vec![1.0], vec![1.0, 2.0]], vec![0.5, 0.5]),
            "All price paths must have the same length"
        );
        assert_error!(
            ScenarioSet::new(vec![vec![1.0], vec![2.0]], vec![1.5, -0.5]),
            "Probabilities cannot be negative"
        );
        assert_error!(
            ScenarioSet::new(vec![vec![1.0], vec![2.0]], vec![0.5, 0.75]),
            "Probabilities must sum to one (got 1.25)"
        );
    }

    #[test]
    fn test_uniform_and_degenerate() {
        let set = ScenarioSet::uniform(vec![vec![0.0]; 4]).unwrap();
        for &prob in set.probabilities() {
            assert_approx_eq!(f64, prob, 0.25);
        }

        let set = ScenarioSet::degenerate(&[5.0, 6.0]).unwrap();
        assert_eq!(set.len(), 1);
        assert_approx_eq!(f64, set.probability(0), 1.0);
    }

    #[test]
    fn test_payment() {
        assert_approx_eq!(f64, payment(&[10.0, 20.0], &[-1.0, 2.0]), 30.0);
    }
}

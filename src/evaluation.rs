//! Clearing bids against the realized price and valuing the result.
use crate::bid::{BidSet, BidType};
use crate::resource::{ResourceParameters, fixed_dispatch_utility, solve_scenarios};
use crate::scenario::{PricePath, ScenarioSet};
use crate::solver::SolverOptions;
use anyhow::{Result, ensure};
use itertools::Itertools;
use log::debug;
use std::cmp::Ordering;

/// The result of clearing a bid set at the realized price
#[derive(Debug, Clone, PartialEq)]
pub struct MarketOutcome {
    /// The total accepted quantity in every period
    pub bundle: PricePath,
    /// Indices of the accepted bids
    pub accepted: Vec<usize>,
    /// Utility of dispatching `bundle`, or `None` if the resource cannot
    pub utility: Option<f64>,
}

/// Clear `bids` at `real_price` and compute the resulting utility.
///
/// Exclusive bids: the most profitable bid is accepted if its profit is non-negative, otherwise
/// nothing is. Ties are broken in favour of the lexicographically smallest quantity profile so the
/// outcome does not depend on the order of the bids.
///
/// Ungrouped bids: every bid with non-negative profit is accepted and their quantities are summed.
pub fn evaluate(
    parameters: &ResourceParameters,
    bids: &BidSet,
    bid_type: BidType,
    real_price: &[f64],
    options: &SolverOptions,
) -> Result<MarketOutcome> {
    ensure!(
        bids.iter().all(|bid| bid.quantity.len() == real_price.len()),
        "Bids must cover the {} periods of the realized price",
        real_price.len()
    );

    let accepted = match bid_type {
        BidType::Exclusive => clear_exclusive(bids, real_price),
        BidType::Ungrouped => bids
            .iter()
            .positions(|bid| bid.profit(real_price) >= 0.0)
            .collect(),
    };

    let mut bundle = vec![0.0; real_price.len()];
    for bid in accepted.iter().map(|b| &bids.bids()[*b]) {
        for (total, quantity) in bundle.iter_mut().zip_eq(&bid.quantity) {
            *total += quantity;
        }
    }
    debug!("Accepted bids {accepted:?} ({bid_type:?})");

    let utility = fixed_dispatch_utility(parameters, real_price, &bundle, options)?;

    Ok(MarketOutcome {
        bundle,
        accepted,
        utility,
    })
}

/// The index of the winning exclusive bid, if any
fn clear_exclusive(bids: &BidSet, real_price: &[f64]) -> Vec<usize> {
    let winner = bids
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| {
            a.profit(real_price)
                .total_cmp(&b.profit(real_price))
                .then_with(|| compare_quantities(&b.quantity, &a.quantity))
        })
        .filter(|(_, bid)| bid.profit(real_price) >= 0.0);

    winner.map(|(b, _)| b).into_iter().collect()
}

/// Lexicographic order of two quantity profiles
fn compare_quantities(a: &[f64], b: &[f64]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(a, b)| a.total_cmp(b))
        .find(|ordering| ordering.is_ne())
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

/// The best dispatch and its utility if `real_price` were known in advance.
///
/// This bounds the utility achievable by any bid set.
pub fn perfect_information(
    parameters: &ResourceParameters,
    real_price: &[f64],
    options: &SolverOptions,
) -> Result<(PricePath, f64)> {
    let scenarios = ScenarioSet::degenerate(real_price)?;
    let mut solved = solve_scenarios(parameters, &scenarios, options)?;
    let bundle = solved.bundles.swap_remove(0);

    Ok((bundle, solved.objective))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bid::Bid;
    use crate::fixture::{assert_error, two_scenario_prices};
    use crate::formulation::{exclusive_lp, self_schedule};
    use crate::resource::Technology;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    fn thermal_bids() -> BidSet {
        BidSet::new(vec![
            Bid::zero(2),
            Bid {
                quantity: vec![-200.0, -400.0],
                price: -19000.0,
            },
        ])
        .unwrap()
    }

    #[rstest]
    #[case([10.0, 10.0], vec![0], 0.0)]
    #[case([50.0, 50.0], vec![1], 11000.0)]
    fn test_exclusive_thermal(
        #[case] real_price: [f64; 2],
        #[case] accepted: Vec<usize>,
        #[case] utility: f64,
    ) {
        let parameters = ResourceParameters::default_for(Technology::ThermalGenerator);
        let outcome = evaluate(
            &parameters,
            &thermal_bids(),
            BidType::Exclusive,
            &real_price,
            &SolverOptions::default(),
        )
        .unwrap();
        assert_eq!(outcome.accepted, accepted);
        assert_approx_eq!(f64, outcome.utility.unwrap(), utility, epsilon = 1e-6);
    }

    #[rstest]
    #[case([10.0, 10.0], vec![0.0, 0.0], 0.0)]
    #[case([50.0, 50.0], vec![-200.0, -400.0], 11000.0)]
    fn test_exclusive_lp_bids_clear(
        two_scenario_prices: ScenarioSet,
        #[case] real_price: [f64; 2],
        #[case] bundle: Vec<f64>,
        #[case] utility: f64,
    ) {
        let parameters = ResourceParameters::default_for(Technology::ThermalGenerator);
        let options = SolverOptions::default();
        let result = exclusive_lp(&parameters, &two_scenario_prices, 2, &options).unwrap();
        let outcome = evaluate(
            &parameters,
            &result.bids,
            BidType::Exclusive,
            &real_price,
            &options,
        )
        .unwrap();

        // Only the bid designed for the realized scenario is in the money
        assert_eq!(outcome.accepted.len(), 1);
        for (q, expected) in outcome.bundle.iter().zip(bundle) {
            assert_approx_eq!(f64, *q, expected, epsilon = 1e-6);
        }
        assert_approx_eq!(f64, outcome.utility.unwrap(), utility, epsilon = 1e-6);
    }

    #[test]
    fn test_exclusive_none_profitable() {
        let bids = BidSet::new(vec![Bid {
            quantity: vec![-200.0, -400.0],
            price: -19000.0,
        }])
        .unwrap();
        let parameters = ResourceParameters::default_for(Technology::ThermalGenerator);
        let outcome = evaluate(
            &parameters,
            &bids,
            BidType::Exclusive,
            &[10.0, 10.0],
            &SolverOptions::default(),
        )
        .unwrap();
        assert!(outcome.accepted.is_empty());
        assert_eq!(outcome.bundle, vec![0.0, 0.0]);
        assert_approx_eq!(f64, outcome.utility.unwrap(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_exclusive_relabeling() {
        // Equal profits at a price of 20: -3000 - 20 * (-150) = 0 = -1000 - 20 * (-50)
        let bids = vec![
            Bid {
                quantity: vec![-50.0],
                price: -1000.0,
            },
            Bid {
                quantity: vec![-150.0],
                price: -3000.0,
            },
        ];
        let parameters = ResourceParameters::default_for(Technology::Battery);
        let forward = BidSet::new(bids.clone()).unwrap();
        let reversed = BidSet::new(bids.into_iter().rev().collect()).unwrap();

        let clear = |bids: &BidSet| {
            evaluate(
                &parameters,
                bids,
                BidType::Exclusive,
                &[20.0],
                &SolverOptions::default(),
            )
            .unwrap()
            .bundle
        };
        assert_eq!(clear(&forward), vec![-150.0]);
        assert_eq!(clear(&reversed), vec![-150.0]);
    }

    #[test]
    fn test_ungrouped_sums_accepted() {
        let bids = BidSet::new(vec![
            Bid {
                quantity: vec![-5.0, 0.0],
                price: -100.0,
            },
            Bid {
                quantity: vec![0.0, -5.0],
                price: -100.0,
            },
            Bid {
                quantity: vec![5.0, 5.0],
                price: 0.0,
            },
        ])
        .unwrap();
        let parameters = ResourceParameters::default_for(Technology::Battery);
        let outcome = evaluate(
            &parameters,
            &bids,
            BidType::Ungrouped,
            &[30.0, 30.0],
            &SolverOptions::default(),
        )
        .unwrap();
        assert_eq!(outcome.accepted, vec![0, 1]);
        assert_eq!(outcome.bundle, vec![-5.0, -5.0]);

        // Discharging without charging again breaks the closed cycle
        assert!(outcome.utility.is_none());
    }

    #[test]
    fn test_wrong_length() {
        let parameters = ResourceParameters::default_for(Technology::Battery);
        assert_error!(
            evaluate(
                &parameters,
                &thermal_bids(),
                BidType::Exclusive,
                &[10.0],
                &SolverOptions::default()
            ),
            "Bids must cover the 1 periods of the realized price"
        );
    }

    #[test]
    fn test_perfect_information() {
        let parameters = ResourceParameters::default_for(Technology::ThermalGenerator);
        let (bundle, utility) =
            perfect_information(&parameters, &[50.0, 50.0], &SolverOptions::default()).unwrap();
        for (q, expected) in bundle.iter().zip([-200.0, -400.0]) {
            assert_approx_eq!(f64, *q, expected, epsilon = 1e-6);
        }
        assert_approx_eq!(f64, utility, 11000.0, epsilon = 1e-6);
    }

    #[rstest]
    #[case(Technology::ThermalGenerator, [50.0, 50.0])]
    #[case(Technology::Battery, [10.0, 50.0])]
    #[case(Technology::DemandResponse, [10.0, 50.0])]
    fn test_bounded_by_perfect_information(
        two_scenario_prices: ScenarioSet,
        #[case] technology: Technology,
        #[case] real_price: [f64; 2],
    ) {
        let mut parameters = ResourceParameters::default_for(technology);
        if let ResourceParameters::DemandResponse(params) = &mut parameters {
            params.heat_load.truncate(2);
        }
        let options = SolverOptions::default();
        let (_, maximal) = perfect_information(&parameters, &real_price, &options).unwrap();

        let schedule = self_schedule(&parameters, &two_scenario_prices, &real_price, &options)
            .unwrap();
        assert!(schedule.utility.unwrap() <= maximal + 1e-6 * maximal.abs().max(1.0));

        let bids = exclusive_lp(&parameters, &two_scenario_prices, 2, &options).unwrap();
        let outcome = evaluate(
            &parameters,
            &bids.bids,
            BidType::Exclusive,
            &real_price,
            &options,
        )
        .unwrap();
        if let Some(utility) = outcome.utility {
            assert!(utility <= maximal + 1e-6 * maximal.abs().max(1.0));
        }
    }
}

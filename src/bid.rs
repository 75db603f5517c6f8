//! Bids submitted to the auction.
//!
//! A bid offers a quantity profile over the whole time horizon for a single total price. The same
//! [`BidSet`] can be cleared in two ways (see [`BidType`]).
use crate::scenario::payment;
use anyhow::{Result, bail, ensure};
use indexmap::IndexMap;
use serde::Serialize;
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};

/// A price-quantity bid
#[derive(Debug, Clone, PartialEq)]
pub struct Bid {
    /// Quantity traded in each period (negative quantities are sold)
    pub quantity: Vec<f64>,
    /// Total price asked for the whole profile
    pub price: f64,
}

impl Bid {
    /// A bid to trade nothing, for nothing
    pub fn zero(num_periods: usize) -> Self {
        Self {
            quantity: vec![0.0; num_periods],
            price: 0.0,
        }
    }

    /// The profit of having this bid accepted at the given prices.
    ///
    /// This is `price - Σ_t prices[t] * quantity[t]`.
    pub fn profit(&self, prices: &[f64]) -> f64 {
        self.price - payment(prices, &self.quantity)
    }
}

/// How the bids in a [`BidSet`] are cleared
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, SerializeLabeledStringEnum, DeserializeLabeledStringEnum,
)]
pub enum BidType {
    /// At most one bid in the set may be accepted
    #[string = "exclusive"]
    Exclusive,
    /// Each bid is accepted or rejected independently
    #[string = "ungrouped"]
    Ungrouped,
}

/// A value in the keyed form of a [`BidSet`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BidEntry {
    /// The quantity profile of a bid (key `x{b}`)
    Quantity(Vec<f64>),
    /// The price of a bid (key `p{b}`)
    Price(f64),
}

/// An ordered collection of bids over a common time horizon
#[derive(Debug, Clone, PartialEq)]
pub struct BidSet {
    bids: Vec<Bid>,
}

impl BidSet {
    /// Create a new [`BidSet`], checking that every bid covers the same horizon
    pub fn new(bids: Vec<Bid>) -> Result<Self> {
        if let Some(first) = bids.first() {
            let num_periods = first.quantity.len();
            ensure!(
                bids.iter().all(|bid| bid.quantity.len() == num_periods),
                "All bids must cover the same number of periods"
            );
        }
        ensure!(
            bids.iter()
                .all(|bid| bid.price.is_finite() && bid.quantity.iter().all(|q| q.is_finite())),
            "Bid prices and quantities must be finite"
        );

        Ok(Self { bids })
    }

    /// The number of bids
    pub fn len(&self) -> usize {
        self.bids.len()
    }

    /// Whether the set has no bids
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty()
    }

    /// The bids, in order
    pub fn bids(&self) -> &[Bid] {
        &self.bids
    }

    /// Iterate over the bids
    pub fn iter(&self) -> impl Iterator<Item = &Bid> {
        self.bids.iter()
    }

    /// A copy of this set padded with zero bids up to `len` bids
    pub fn padded(&self, len: usize, num_periods: usize) -> Self {
        let mut bids = self.bids.clone();
        bids.resize(len.max(bids.len()), Bid::zero(num_periods));
        Self { bids }
    }

    /// The keyed form of the set: `x{b}` maps to the quantity of bid `b` and `p{b}` to its price
    pub fn to_keyed(&self) -> IndexMap<String, BidEntry> {
        self.bids
            .iter()
            .enumerate()
            .flat_map(|(b, bid)| {
                [
                    (format!("x{b}"), BidEntry::Quantity(bid.quantity.clone())),
                    (format!("p{b}"), BidEntry::Price(bid.price)),
                ]
            })
            .collect()
    }

    /// Create a [`BidSet`] from its keyed form
    pub fn from_keyed(keyed: &IndexMap<String, BidEntry>) -> Result<Self> {
        ensure!(
            keyed.len() % 2 == 0,
            "Keyed bids must have one quantity and one price per bid"
        );
        let bids = (0..keyed.len() / 2)
            .map(|b| {
                let Some(BidEntry::Quantity(quantity)) = keyed.get(&format!("x{b}")) else {
                    bail!("Missing quantity x{b}");
                };
                let Some(BidEntry::Price(price)) = keyed.get(&format!("p{b}")) else {
                    bail!("Missing price p{b}");
                };
                Ok(Bid {
                    quantity: quantity.clone(),
                    price: *price,
                })
            })
            .collect::<Result<_>>()?;

        Self::new(bids)
    }
}

impl FromIterator<Bid> for BidSet {
    fn from_iter<I: IntoIterator<Item = Bid>>(iter: I) -> Self {
        Self {
            bids: iter.into_iter().collect(),
        }
    }
}

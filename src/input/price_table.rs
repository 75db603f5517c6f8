//! Reading tables of hourly prices keyed by calendar date.
//!
//! Both the point forecasts and the realized prices are stored in this format: one row per day
//! with a `Date` column followed by one column per hour of the day (`h0`, `h1`, ...).
use super::{input_err_msg, parse_date};
use crate::scenario::PricePath;
use anyhow::{Context, Result, ensure};
use chrono::NaiveDate;
use indexmap::IndexMap;
use std::path::Path;

/// The name of the date column
const DATE_COLUMN: &str = "Date";

/// A table of daily price paths, in calendar order
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    rows: IndexMap<NaiveDate, PricePath>,
}

impl PriceTable {
    /// Create a [`PriceTable`] from rows of `(date, prices)`.
    ///
    /// Dates must be strictly increasing and every row must have the same number of prices.
    pub fn new<I>(rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = (NaiveDate, PricePath)>,
    {
        let mut map = IndexMap::new();
        let mut num_periods = None;
        for (date, prices) in rows {
            if let Some((last, _)) = map.last() {
                ensure!(
                    date > *last,
                    "Dates must be in increasing order ({date} follows {last})"
                );
            }
            let expected = *num_periods.get_or_insert(prices.len());
            ensure!(
                prices.len() == expected,
                "Row for {date} has {} prices, expected {expected}",
                prices.len()
            );
            ensure!(
                prices.iter().all(|price| price.is_finite()),
                "Row for {date} contains non-finite prices"
            );
            map.insert(date, prices);
        }
        ensure!(!map.is_empty(), "Price table cannot be empty");

        Ok(Self { rows: map })
    }

    /// Read a [`PriceTable`] from a CSV file
    pub fn from_path(file_path: &Path) -> Result<Self> {
        Self::from_path_impl(file_path).with_context(|| input_err_msg(file_path))
    }

    fn from_path_impl(file_path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(file_path)?;
        let headers = reader.headers()?.clone();
        ensure!(
            headers.get(0) == Some(DATE_COLUMN),
            "First column must be '{DATE_COLUMN}'"
        );
        for (hour, header) in headers.iter().skip(1).enumerate() {
            ensure!(
                header == format!("h{hour}"),
                "Unexpected column '{header}': hour columns must be h0, h1, ..."
            );
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let date = parse_date(&record[0])?;
            let prices = record
                .iter()
                .skip(1)
                .map(|field| {
                    field
                        .trim()
                        .parse::<f64>()
                        .with_context(|| format!("Invalid price '{field}' for {date}"))
                })
                .collect::<Result<PricePath>>()?;
            rows.push((date, prices));
        }

        Self::new(rows)
    }

    /// The number of periods in each row
    pub fn num_periods(&self) -> usize {
        self.rows[0].len()
    }

    /// The number of days in the table
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows (never true for a validated table)
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The row index of the given date
    pub fn position(&self, date: NaiveDate) -> Result<usize> {
        self.rows
            .get_index_of(&date)
            .with_context(|| format!("No prices for {date}"))
    }

    /// The prices for the given date
    pub fn get(&self, date: NaiveDate) -> Result<&PricePath> {
        self.rows
            .get(&date)
            .with_context(|| format!("No prices for {date}"))
    }

    /// The date and prices at the given row index
    pub fn get_index(&self, index: usize) -> Option<(NaiveDate, &PricePath)> {
        self.rows.get_index(index).map(|(date, prices)| (*date, prices))
    }

    /// Iterate over the dates in the table
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.rows.keys().copied()
    }

    /// The largest absolute price anywhere in the table
    pub fn max_abs_price(&self) -> f64 {
        self.rows
            .values()
            .flatten()
            .map(|price| price.abs())
            .fold(0.0, f64::max)
    }

    /// Check that `other` covers exactly the same dates and periods as this table
    pub fn check_aligned(&self, other: &PriceTable) -> Result<()> {
        ensure!(
            self.num_periods() == other.num_periods(),
            "Price tables have different numbers of periods ({} vs {})",
            self.num_periods(),
            other.num_periods()
        );
        ensure!(
            self.dates().eq(other.dates()),
            "Price tables must cover the same dates"
        );

        Ok(())
    }
}

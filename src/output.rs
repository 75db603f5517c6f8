//! The module responsible for writing output data to disk.
use crate::bid::BidSet;
use crate::case::{Approach, BidApproach};
use crate::input::DATE_FORMAT;
use crate::scenario::ScenarioSet;
use crate::solver::SolveStatus;
use anyhow::{Context, Result, ensure};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod metadata;

/// The output file name for the comparison of approaches
const RESULTS_FILE_NAME: &str = "results.csv";

/// The output file name for submitted bids
const BIDS_FILE_NAME: &str = "bids.csv";

/// The output file name for the generated scenarios
const SCENARIOS_FILE_NAME: &str = "debug_scenarios.csv";

/// Get the default output directory for the case at `case_dir`
pub fn get_output_dir(case_dir: &Path, results_root: &Path) -> Result<PathBuf> {
    // Canonicalise in case the user has specified "."
    let case_dir = case_dir
        .canonicalize()
        .context("Could not resolve path to case")?;

    let case_name = case_dir
        .file_name()
        .context("Case cannot be in root folder")?
        .to_str()
        .context("Invalid chars in case dir name")?;

    Ok(results_root.join(case_name))
}

/// Create a new output directory, returning whether an existing one will be overwritten.
///
/// Fails if the directory already exists and is not empty, unless `allow_overwrite` is set.
pub fn create_output_directory(output_dir: &Path, allow_overwrite: bool) -> Result<bool> {
    let overwrite = if let Ok(mut it) = fs::read_dir(output_dir) {
        if it.next().is_none() {
            // Empty folder
            return Ok(false);
        }

        ensure!(
            allow_overwrite,
            "Output folder already exists and is not empty. Please delete the folder or pass \
             the --overwrite command-line option."
        );

        fs::remove_dir_all(output_dir)?;
        true
    } else {
        false
    };

    fs::create_dir_all(output_dir)?;

    Ok(overwrite)
}

/// Serialise a date for output files
fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// How one approach performed on one date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyRecord {
    /// The day on which the bids were submitted
    pub date: String,
    /// The approach used
    pub approach: BidApproach,
    /// Number of price scenarios
    pub num_scenarios: usize,
    /// Number of bids allowed
    pub bid_set_size: usize,
    /// Whether the exclusive MILP was started from the exclusive LP bids
    pub warm_start: bool,
    /// How the solve(s) terminated
    pub status: SolveStatus,
    /// Time spent in the solver, in seconds
    pub runtime: f64,
    /// Realized utility of the bids (empty if they could not be dispatched)
    pub bid_utility: Option<f64>,
    /// Utility with perfect information about the price
    pub maximal_utility: f64,
    /// Wasserstein distance between the scenarios and the realized price
    pub distance: f64,
}

impl StudyRecord {
    /// Create a new [`StudyRecord`] for `approach`
    pub fn new(
        date: NaiveDate,
        approach: &Approach,
        status: SolveStatus,
        runtime: Duration,
        bid_utility: Option<f64>,
        maximal_utility: f64,
        distance: f64,
    ) -> Self {
        Self {
            date: format_date(date),
            approach: approach.kind,
            num_scenarios: approach.num_scenarios,
            bid_set_size: approach.bid_set_size,
            warm_start: approach.warm_start,
            status,
            runtime: runtime.as_secs_f64(),
            bid_utility,
            maximal_utility,
            distance,
        }
    }
}

/// One period of one submitted bid
#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct BidRow {
    date: String,
    approach: BidApproach,
    num_scenarios: usize,
    bid_set_size: usize,
    warm_start: bool,
    bid: usize,
    price: f64,
    period: usize,
    quantity: f64,
}

/// One period of one generated scenario
#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct ScenarioRow {
    date: String,
    num_scenarios: usize,
    scenario: usize,
    probability: f64,
    period: usize,
    price: f64,
}

/// An object for writing study results to file
pub struct DataWriter {
    results_writer: csv::Writer<File>,
    bids_writer: csv::Writer<File>,
    scenarios_writer: Option<csv::Writer<File>>,
}

impl DataWriter {
    /// Open CSV files to write output data to
    ///
    /// # Arguments
    ///
    /// * `output_path` - Folder where files will be saved
    /// * `save_debug_info` - Whether to also write the generated scenarios
    pub fn create(output_path: &Path, save_debug_info: bool) -> Result<Self> {
        let new_writer = |file_name| {
            let file_path = output_path.join(file_name);
            csv::Writer::from_path(file_path)
        };

        let scenarios_writer = if save_debug_info {
            Some(new_writer(SCENARIOS_FILE_NAME)?)
        } else {
            None
        };

        Ok(Self {
            results_writer: new_writer(RESULTS_FILE_NAME)?,
            bids_writer: new_writer(BIDS_FILE_NAME)?,
            scenarios_writer,
        })
    }

    /// Write the outcome of one approach on one date
    pub fn write_record(&mut self, record: &StudyRecord) -> Result<()> {
        self.results_writer.serialize(record)?;

        Ok(())
    }

    /// Write the bids submitted by one approach on one date
    pub fn write_bids(
        &mut self,
        date: NaiveDate,
        approach: &Approach,
        bids: &BidSet,
    ) -> Result<()> {
        for (b, bid) in bids.iter().enumerate() {
            for (period, quantity) in bid.quantity.iter().enumerate() {
                let row = BidRow {
                    date: format_date(date),
                    approach: approach.kind,
                    num_scenarios: approach.num_scenarios,
                    bid_set_size: approach.bid_set_size,
                    warm_start: approach.warm_start,
                    bid: b,
                    price: bid.price,
                    period,
                    quantity: *quantity,
                };
                self.bids_writer.serialize(row)?;
            }
        }

        Ok(())
    }

    /// Write generated scenarios, if debug output is enabled
    pub fn write_scenarios(&mut self, date: NaiveDate, scenarios: &ScenarioSet) -> Result<()> {
        let Some(writer) = &mut self.scenarios_writer else {
            return Ok(());
        };

        for (scenario, (prices, probability)) in scenarios.iter().enumerate() {
            for (period, price) in prices.iter().enumerate() {
                let row = ScenarioRow {
                    date: format_date(date),
                    num_scenarios: scenarios.len(),
                    scenario,
                    probability,
                    period,
                    price: *price,
                };
                writer.serialize(row)?;
            }
        }

        Ok(())
    }

    /// Flush the underlying streams
    pub fn flush(&mut self) -> Result<()> {
        self.results_writer.flush()?;
        self.bids_writer.flush()?;
        if let Some(writer) = &mut self.scenarios_writer {
            writer.flush()?;
        }

        Ok(())
    }
}

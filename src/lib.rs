//! Bid determination for a single energy resource in a combinatorial day-ahead electricity
//! auction, under price uncertainty described by weighted price scenarios.
#![warn(missing_docs)]
use std::path::PathBuf;

pub mod bid;
pub mod case;
pub mod cli;
pub mod evaluation;
pub mod formulation;
pub mod input;
pub mod log;
pub mod output;
pub mod resource;
pub mod scenario;
pub mod settings;
pub mod solver;
pub mod study;

#[cfg(test)]
mod fixture;

/// Get the config dir for the program.
///
/// Falls back to the current directory if the platform has no config directory.
pub fn get_combibid_config_dir() -> PathBuf {
    let mut dir = dirs::config_dir().unwrap_or_default();
    dir.push("combibid");

    dir
}

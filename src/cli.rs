//! Command-line interface definitions and argument parsing

use std::path::PathBuf;

use clap::Parser;

use crate::error::{Error, Result};
use crate::pos::{EAST_STORE, WEST_STORE};
use crate::series::BusinessHours;

/// Cafeteria customer-count forecasting from POS exports, the academic
/// calendar and class-attendance matrices
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Checkout export CSV (Shift-JIS); repeat for several files
    #[arg(long, required = true)]
    pub checkouts: Vec<PathBuf>,

    /// Line-item export CSV (Shift-JIS); repeat for several files
    #[arg(long, required = true)]
    pub items: Vec<PathBuf>,

    /// Payment export CSV (Shift-JIS); repeat for several files
    #[arg(long, required = true)]
    pub payments: Vec<PathBuf>,

    /// Academic calendar CSV (date, academic_year, term, class, info)
    #[arg(long)]
    pub calendar: PathBuf,

    /// Attendance matrix CSV for the west campus
    #[arg(long)]
    pub syllabus_west: PathBuf,

    /// Attendance matrix CSV for the east campus
    #[arg(long)]
    pub syllabus_east: PathBuf,

    /// Store to forecast: "west" or "east"
    #[arg(short, long, default_value = "west")]
    pub store: String,

    /// Business-hours window: "lunch", "dinner" or "all"
    #[arg(long, default_value = "lunch")]
    pub hours: String,

    /// Chronological tail fraction held out for validation
    #[arg(long, default_value = "0.2")]
    pub validation_ratio: f64,

    /// Term weeks after which a date counts as the last teaching week
    #[arg(long, default_value = "15")]
    pub max_term_weeks: i32,

    /// Write the combined forecast table to this path as a Shift-JIS CSV
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Resolve the store flag to the display name used in the POS data.
    pub fn store_name(&self) -> Result<&'static str> {
        match self.store.as_str() {
            "west" => Ok(WEST_STORE),
            "east" => Ok(EAST_STORE),
            other => Err(Error::Malformed(format!(
                "unknown store `{other}`, expected `west` or `east`"
            ))),
        }
    }

    /// Resolve the hours flag to a service window.
    pub fn business_hours(&self) -> Result<BusinessHours> {
        match self.hours.as_str() {
            "lunch" => Ok(BusinessHours::Lunch),
            "dinner" => Ok(BusinessHours::Dinner),
            "all" => Ok(BusinessHours::All),
            other => Err(Error::Malformed(format!(
                "unknown hours `{other}`, expected `lunch`, `dinner` or `all`"
            ))),
        }
    }

    /// Validation ratio, bounds-checked: must leave at least one training row.
    pub fn checked_ratio(&self) -> Result<f64> {
        if !(0.0..1.0).contains(&self.validation_ratio) {
            return Err(Error::Malformed(format!(
                "validation ratio {} must be in [0, 1)",
                self.validation_ratio
            )));
        }
        Ok(self.validation_ratio)
    }
}

//! POScope: cafeteria customer-count forecasting from POS exports
//!
//! This is the main entrypoint that orchestrates loading the exports,
//! deriving the features, fitting the model and reporting the forecast.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use polars::prelude::DataFrame;

use poscope::{io, Args, Workspace};

fn main() -> Result<()> {
    let args = Args::parse();

    if args.verbose {
        println!("POScope - Cafeteria Customer Forecasting");
        println!("========================================\n");
    }

    let store = args.store_name()?;
    let hours = args.business_hours()?;
    let ratio = args.checked_ratio()?;

    let start_time = Instant::now();
    let mut workspace = Workspace::new();

    // Step 1: Load and clean the POS exports
    if args.verbose {
        println!("Step 1: Loading POS exports");
        for path in args.checkouts.iter().chain(&args.items).chain(&args.payments) {
            println!("  {}", path.display());
        }
    }
    let checkouts = read_sjis_frames(&args.checkouts)?;
    let items = read_sjis_frames(&args.items)?;
    let payments = read_sjis_frames(&args.payments)?;
    workspace
        .load_pos(&checkouts, &items, &payments)
        .context("loading POS exports")?;
    println!("✓ POS data loaded");
    if let Some((first, last)) = workspace.pos_span(store) {
        println!("  {store}: {first} .. {last}");
    }

    // Step 2: Calendar features and attendance matrices
    if args.verbose {
        println!("\nStep 2: Loading calendar and attendance data");
    }
    let calendar = read_utf8_frame(&args.calendar)?;
    workspace
        .load_calendar(&calendar, args.max_term_weeks)
        .context("loading the academic calendar")?;
    let west = read_utf8_frame(&args.syllabus_west)?;
    let east = read_utf8_frame(&args.syllabus_east)?;
    workspace
        .load_syllabus(&west, &east)
        .context("loading the attendance matrices")?;
    println!("✓ Calendar and attendance data loaded");

    // Step 3: Fit and forecast
    if args.verbose {
        println!("\nStep 3: Fitting the forecast model");
        println!("  Store: {store}");
        println!("  Hours: {}", args.hours);
        println!("  Validation ratio: {ratio}");
    }
    let forecast = workspace
        .forecast(store, hours, ratio)
        .context("running the forecast")?;

    println!("\n=== Fit Report ===");
    let report = &forecast.report;
    println!(
        "Training rows: {} (validation: {})",
        report.n_train, report.n_valid
    );
    println!(
        "Train   RMSE: {:>8.2}  MAPE: {:>6.2}%",
        report.train_rmse,
        report.train_mape * 100.0
    );
    println!(
        "Valid   RMSE: {:>8.2}  MAPE: {:>6.2}%",
        report.valid_rmse,
        report.valid_mape * 100.0
    );

    if args.verbose {
        println!("\nCoefficients (log scale):");
        for (name, value) in forecast.coefficients() {
            println!("  {name:>12}: {value:>9.5}");
        }
        println!("  {:>12}: {:>9.5}", "intercept", forecast.model.intercept());
    }

    match &forecast.future {
        Some(future) => {
            println!("\n=== Forecast ===");
            println!("{future}");
        }
        None => println!("\nNo future dates to forecast."),
    }

    if let Some(path) = &args.output {
        let mut table = forecast.table()?;
        let bytes = io::write_sjis_csv(&mut table)?;
        fs::write(path, bytes)
            .with_context(|| format!("writing the forecast to {}", path.display()))?;
        println!("\nForecast table saved to: {}", path.display());
    }

    let total_time = start_time.elapsed();
    println!("\nTotal processing time: {:.2}s", total_time.as_secs_f64());

    Ok(())
}

/// Read several Shift-JIS encoded CSV exports.
fn read_sjis_frames(paths: &[PathBuf]) -> Result<Vec<DataFrame>> {
    paths
        .iter()
        .map(|path| {
            let bytes =
                fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            io::read_sjis_csv(&bytes).with_context(|| format!("parsing {}", path.display()))
        })
        .collect()
}

fn read_utf8_frame(path: &PathBuf) -> Result<DataFrame> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    io::read_utf8_csv(&bytes).with_context(|| format!("parsing {}", path.display()))
}

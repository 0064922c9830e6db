//! POScope: cafeteria POS reconciliation and daily customer-count forecasting
//!
//! This library turns three manually exported data sets (point-of-sale extracts,
//! a class-attendance matrix per campus, and an academic calendar) into a single
//! chronologically indexed daily table per cafeteria, and fits a log-linear
//! regression over it to forecast daily customer counts.

pub mod calendar;
pub mod cli;
pub mod error;
pub mod io;
pub mod model;
pub mod pos;
pub mod series;
pub mod session;
pub mod split;
pub mod syllabus;
pub mod views;

// Re-export public items for easier access
pub use cli::Args;
pub use error::{Error, Result};
pub use model::{fit_and_forecast, FitReport, Forecast};
pub use pos::{normalize, PosTables};
pub use series::BusinessHours;
pub use session::Workspace;
pub use split::{split_train_predict, SplitSeries};
pub use syllabus::{Syllabus, SyllabusPair};

//! Train/predict partitioning of the assembled series
//!
//! Trainable rows have an observed positive outcome, a teaching-weekday class
//! and a present attendance feature. Predictable rows lie strictly after the
//! last trainable date with the same class/attendance requirements but no
//! outcome. A date with a missing attendance feature is excluded from both
//! subsets regardless of where it falls.

use polars::prelude::*;

use crate::calendar::WEEKDAY_CLASSES;
use crate::error::{Error, Result};
use crate::io;

/// Regressor columns of the assembled table, in model order.
pub const FEATURE_COLS: [&str; 6] = [
    "syllabus",
    "nweek",
    "holiday",
    "replaced",
    "first_week",
    "last_week",
];

/// The two disjoint subsets of the assembled series.
#[derive(Debug)]
pub struct SplitSeries {
    /// Historical rows with full columns: date, customers, calendar, features.
    pub train: DataFrame,
    /// Future rows reduced to the date and the feature columns.
    pub predict: DataFrame,
}

/// Partition the assembled table.
///
/// # Errors
/// * `NoTrainableRows` when nothing qualifies for training; no model can be
///   built and the forecasting flow stops here.
pub fn split_train_predict(assembled: &DataFrame) -> Result<SplitSeries> {
    let n = assembled.height();
    let outcomes = io::i64_values(assembled, "customers")?;
    let classes = io::str_values(assembled, "class")?;
    let attendance = io::f64_values(assembled, "syllabus")?;
    let dates = io::date_values(assembled, "date")?;

    let is_weekday =
        |class: &Option<String>| class.as_deref().is_some_and(|c| WEEKDAY_CLASSES.contains(&c));

    let mut train_mask = vec![false; n];
    let mut last_train_date = None;
    for i in 0..n {
        let trainable = outcomes[i].is_some_and(|v| v > 0)
            && is_weekday(&classes[i])
            && attendance[i].is_some();
        train_mask[i] = trainable;
        if trainable {
            last_train_date = last_train_date.max(dates[i]);
        }
    }
    let Some(last_train_date) = last_train_date else {
        return Err(Error::NoTrainableRows);
    };

    let mut predict_mask = vec![false; n];
    for i in 0..n {
        predict_mask[i] = dates[i].is_some_and(|d| d > last_train_date)
            && is_weekday(&classes[i])
            && attendance[i].is_some();
    }

    let train = assembled.filter(&BooleanChunked::from_slice("mask", &train_mask))?;
    let predict_cols: Vec<&str> = std::iter::once("date").chain(FEATURE_COLS).collect();
    let predict = assembled
        .filter(&BooleanChunked::from_slice("mask", &predict_mask))?
        .select(predict_cols)?;
    Ok(SplitSeries { train, predict })
}

//! Log-linear regression over the assembled daily series
//!
//! Fits ordinary least squares on log(customers) against the six regressors,
//! holding out the chronologically last slice for validation (never a random
//! sample, so the evaluation respects temporal order). Predictions are
//! exponentiated back to count scale. Fitting is deterministic given the same
//! inputs and split ratio; a failed fit is terminal for the run.

use linfa::prelude::*;
use linfa_linear::{FittedLinearRegression, LinearRegression};
use ndarray::{s, Array1, Array2};
use polars::prelude::*;

use crate::error::{Error, Result};
use crate::split::{SplitSeries, FEATURE_COLS};

/// Fraction of trainable rows held out as the validation slice.
pub const DEFAULT_VALIDATION_RATIO: f64 = 0.2;

/// Accuracy of the fitted model on the training and validation slices.
#[derive(Debug, Clone, Copy)]
pub struct FitReport {
    pub train_rmse: f64,
    pub train_mape: f64,
    pub valid_rmse: f64,
    pub valid_mape: f64,
    pub n_train: usize,
    pub n_valid: usize,
}

/// A fitted forecast: in-sample predictions, optional future forecast and the
/// accuracy report.
#[derive(Debug)]
pub struct Forecast {
    pub model: FittedLinearRegression<f64>,
    pub report: FitReport,
    /// Trainable dates with observed and predicted counts:
    /// columns date, actual, predicted.
    pub fitted: DataFrame,
    /// Forecast for the predictable subset, absent when that subset is empty.
    pub future: Option<DataFrame>,
}

impl Forecast {
    /// Regressor names paired with their fitted coefficients (log scale).
    pub fn coefficients(&self) -> Vec<(&'static str, f64)> {
        FEATURE_COLS
            .iter()
            .zip(self.model.params().iter())
            .map(|(name, value)| (*name, *value))
            .collect()
    }

    /// One combined table over the trainable and predictable dates, with the
    /// actual count null on future rows. This is the download artifact.
    pub fn table(&self) -> Result<DataFrame> {
        let mut table = self.fitted.clone();
        if let Some(future) = &self.future {
            let nulls: Vec<Option<f64>> = vec![None; future.height()];
            let mut future = future.clone();
            future.with_column(Series::new("actual", nulls))?;
            let future = future.select(["date", "actual", "predicted"])?;
            table.vstack_mut(&future)?;
        }
        Ok(table)
    }
}

/// Fit the log-linear model on the trainable subset and apply it to the
/// predictable subset.
///
/// # Arguments
/// * `split` - the partitioned series from the splitter
/// * `validation_ratio` - chronological tail fraction held out for validation
///
/// # Errors
/// * `NoTrainableRows` when the holdout would leave nothing to fit on
/// * `Fit` when the design matrix cannot be solved or carries missing values
pub fn fit_and_forecast(split: &SplitSeries, validation_ratio: f64) -> Result<Forecast> {
    let x = feature_matrix(&split.train)?;
    let y = target_vector(&split.train)?;

    let n = x.nrows();
    let n_valid = ((n as f64) * validation_ratio).ceil() as usize;
    let n_train = n.saturating_sub(n_valid);
    if n_train == 0 {
        return Err(Error::NoTrainableRows);
    }

    // Rows arrive in date order from the splitter, so a plain prefix/suffix
    // split keeps the validation slice chronological.
    let x_train = x.slice(s![..n_train, ..]).to_owned();
    let x_valid = x.slice(s![n_train.., ..]).to_owned();
    let y_train = y.slice(s![..n_train]).to_owned();
    let y_valid = y.slice(s![n_train..]).to_owned();

    let dataset = Dataset::new(x_train.clone(), y_train.mapv(f64::ln));
    let model = LinearRegression::default()
        .fit(&dataset)
        .map_err(|e| Error::Fit(e.to_string()))?;

    let pred_train = model.predict(&x_train).mapv(f64::exp);
    let pred_valid = model.predict(&x_valid).mapv(f64::exp);

    let report = FitReport {
        train_rmse: rmse(&y_train, &pred_train),
        train_mape: mape(&y_train, &pred_train),
        valid_rmse: rmse(&y_valid, &pred_valid),
        valid_mape: mape(&y_valid, &pred_valid),
        n_train,
        n_valid,
    };

    let mut predicted: Vec<f64> = pred_train.to_vec();
    predicted.extend(pred_valid.iter());
    let actual = split.train.column("customers")?.cast(&DataType::Float64)?;
    let fitted = DataFrame::new(vec![
        split.train.column("date")?.clone(),
        actual.with_name("actual"),
        Series::new("predicted", predicted),
    ])?;

    let future = if split.predict.height() > 0 {
        let x_future = feature_matrix(&split.predict)?;
        let pred_future = model.predict(&x_future).mapv(f64::exp);
        Some(DataFrame::new(vec![
            split.predict.column("date")?.clone(),
            Series::new("predicted", pred_future.to_vec()),
        ])?)
    } else {
        None
    };

    Ok(Forecast {
        model,
        report,
        fitted,
        future,
    })
}

/// Extract the regressors as a dense float matrix, in `FEATURE_COLS` order.
fn feature_matrix(df: &DataFrame) -> Result<Array2<f64>> {
    let mut x = Array2::zeros((df.height(), FEATURE_COLS.len()));
    for (j, name) in FEATURE_COLS.iter().enumerate() {
        let values = crate::io::f64_values(df, name)?;
        for (i, value) in values.iter().enumerate() {
            match value {
                Some(v) => x[[i, j]] = *v,
                None => {
                    return Err(Error::Fit(format!(
                        "feature column `{name}` carries missing values"
                    )))
                }
            }
        }
    }
    Ok(x)
}

fn target_vector(df: &DataFrame) -> Result<Array1<f64>> {
    let values = crate::io::f64_values(df, "customers")?;
    let mut y = Array1::zeros(values.len());
    for (i, value) in values.iter().enumerate() {
        match value {
            Some(v) => y[i] = *v,
            None => {
                return Err(Error::Fit(
                    "outcome column carries missing values".to_string(),
                ))
            }
        }
    }
    Ok(y)
}

fn rmse(actual: &Array1<f64>, predicted: &Array1<f64>) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let diff = actual - predicted;
    diff.mapv(|v| v * v).mean().unwrap_or(0.0).sqrt()
}

fn mape(actual: &Array1<f64>, predicted: &Array1<f64>) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| ((a - p) / a).abs())
        .sum::<f64>()
        / actual.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io;
    use crate::split::split_train_predict;
    use chrono::{Duration, NaiveDate};

    /// A noise-free series: customers = exp(2 + 0.01 * syllabus), with the
    /// remaining regressors varied enough to keep the design matrix regular.
    fn synthetic_split(n_future: usize) -> SplitSeries {
        let start = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        let n = 20 + n_future;
        let mut dates = Vec::new();
        let mut customers: Vec<Option<f64>> = Vec::new();
        let mut syllabus = Vec::new();
        let mut nweek = Vec::new();
        let mut holiday = Vec::new();
        let mut replaced = Vec::new();
        let mut first_week = Vec::new();
        let mut last_week = Vec::new();
        let classes: Vec<&str> = (0..n)
            .map(|i| ["MON", "TUE", "WED", "THU", "FRI"][i % 5])
            .collect();
        for i in 0..n {
            dates.push(Some(start + Duration::days(i as i64)));
            let syl = 100.0 + (i as f64) * 17.0;
            syllabus.push(Some(syl));
            nweek.push(Some((i / 5 + 1) as i32));
            holiday.push(i32::from(i % 7 == 3));
            replaced.push(i32::from(i % 5 == 2));
            first_week.push(i32::from(i < 5));
            last_week.push(i32::from(i % 11 == 6));
            if i < 20 {
                customers.push(Some((2.0 + 0.01 * syl).exp()));
            } else {
                customers.push(None);
            }
        }
        let df = DataFrame::new(vec![
            io::date_series("date", &dates).unwrap(),
            Series::new("customers", customers),
            Series::new("class", classes),
            Series::new("syllabus", syllabus),
            Series::new("nweek", nweek),
            Series::new("holiday", holiday),
            Series::new("replaced", replaced),
            Series::new("first_week", first_week),
            Series::new("last_week", last_week),
        ])
        .unwrap();
        split_train_predict(&df).unwrap()
    }

    #[test]
    fn perfect_series_fits_with_zero_error() {
        let split = synthetic_split(0);
        let forecast = fit_and_forecast(&split, DEFAULT_VALIDATION_RATIO).unwrap();
        assert_eq!(forecast.report.n_train, 16);
        assert_eq!(forecast.report.n_valid, 4);
        assert!(forecast.report.train_mape < 1e-6);
        assert!(forecast.report.valid_mape < 1e-6);
        assert!(forecast.report.train_rmse < 1e-4);
        assert!(forecast.report.valid_rmse < 1e-4);
        assert!(forecast.future.is_none());
    }

    #[test]
    fn future_forecast_reproduces_the_generating_curve() {
        let split = synthetic_split(5);
        let forecast = fit_and_forecast(&split, DEFAULT_VALIDATION_RATIO).unwrap();
        let future = forecast.future.as_ref().unwrap();
        assert_eq!(future.height(), 5);
        let predicted = io::f64_values(future, "predicted").unwrap();
        let syllabus = io::f64_values(&split.predict, "syllabus").unwrap();
        for (pred, syl) in predicted.iter().zip(&syllabus) {
            let expected = (2.0 + 0.01 * syl.unwrap()).exp();
            assert!((pred.unwrap() - expected).abs() / expected < 1e-6);
        }
    }

    #[test]
    fn validation_slice_is_the_chronological_tail() {
        let split = synthetic_split(0);
        let forecast = fit_and_forecast(&split, 0.25).unwrap();
        assert_eq!(forecast.report.n_train, 15);
        assert_eq!(forecast.report.n_valid, 5);
    }

    #[test]
    fn combined_table_spans_fit_and_future() {
        let split = synthetic_split(3);
        let forecast = fit_and_forecast(&split, DEFAULT_VALIDATION_RATIO).unwrap();
        let table = forecast.table().unwrap();
        assert_eq!(table.height(), 23);
        let actual = io::f64_values(&table, "actual").unwrap();
        assert!(actual[..20].iter().all(Option::is_some));
        assert!(actual[20..].iter().all(Option::is_none));
    }

    #[test]
    fn refusing_to_fit_on_an_empty_training_slice() {
        let split = synthetic_split(0);
        assert!(matches!(
            fit_and_forecast(&split, 1.0),
            Err(Error::NoTrainableRows)
        ));
    }
}

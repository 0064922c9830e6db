//! Attendance matrix aggregation
//!
//! One matrix per campus: rows keyed by (weekday, period), one column per
//! year+term (e.g. `2024SPR`) holding the expected in-person headcount. The
//! demand regressor for a teaching day is the sum over the morning and midday
//! periods 1..=3; a year+term without a matching column yields `None`, never
//! zero, and that null must propagate downstream.

use std::collections::HashMap;

use polars::prelude::*;

use crate::calendar::{MAIN_TERMS, WEEKDAY_CLASSES};
use crate::error::{Error, Result};
use crate::io;
use crate::pos::{EAST_STORE, WEST_STORE};

/// Weekday row labels in the matrix, Monday first.
const JP_DAYNAMES: [&str; 5] = ["月", "火", "水", "木", "金"];

/// Periods summed into the attendance regressor (lunch demand drivers).
const MORNING_PERIODS: [i64; 3] = [1, 2, 3];

/// Expected in-person attendance for one campus.
#[derive(Debug, Clone)]
pub struct Syllabus {
    /// (weekday label, period) -> term key -> headcount. Blank cells are absent.
    rows: HashMap<(String, i64), HashMap<String, f64>>,
    /// Term keys present as columns, chronologically sorted.
    term_keys: Vec<String>,
}

impl Syllabus {
    /// Build from a matrix table whose first two columns are the weekday label
    /// and the period; every further column must be a `<year><term>` key.
    pub fn from_frame(df: &DataFrame) -> Result<Self> {
        let names = df.get_column_names();
        if names.len() < 3 {
            return Err(Error::Malformed(
                "attendance matrix needs weekday, period and at least one term column".to_string(),
            ));
        }
        let day_col = names[0];
        let period_col = names[1];
        let mut term_keys = Vec::new();
        for key in &names[2..] {
            if parse_term_key(key).is_none() {
                return Err(Error::Malformed(format!(
                    "`{key}` is not a <year><term> attendance column"
                )));
            }
            term_keys.push((*key).to_string());
        }
        sort_term_keys(&mut term_keys);

        let days = io::str_values(df, day_col)?;
        let periods = io::i64_values(df, period_col)?;
        let mut key_values = Vec::with_capacity(term_keys.len());
        for key in &term_keys {
            key_values.push(io::f64_values(df, key)?);
        }
        let mut rows: HashMap<(String, i64), HashMap<String, f64>> = HashMap::new();
        for (i, (day, period)) in days.iter().zip(&periods).enumerate() {
            let (Some(day), Some(period)) = (day, period) else {
                continue;
            };
            let mut cells = HashMap::new();
            for (key, values) in term_keys.iter().zip(&key_values) {
                if let Some(value) = values.get(i).copied().flatten() {
                    cells.insert(key.clone(), value);
                }
            }
            rows.insert((day.clone(), *period), cells);
        }
        Ok(Syllabus { rows, term_keys })
    }

    /// Expected attendance for a teaching day: the sum of periods 1..=3 in the
    /// column for that academic year and term.
    ///
    /// Returns `None` when the class value is not a weekday, the term is not a
    /// main term, the year+term column is missing, or a period row is absent.
    pub fn lookup(&self, class: &str, academic_year: i64, term: &str) -> Option<f64> {
        if !MAIN_TERMS.contains(&term) {
            return None;
        }
        let day_index = WEEKDAY_CLASSES.iter().position(|c| *c == class)?;
        let key = format!("{academic_year}{term}");
        if !self.term_keys.contains(&key) {
            return None;
        }
        let day = JP_DAYNAMES[day_index];
        let mut total = 0.0;
        for period in MORNING_PERIODS {
            let cells = self.rows.get(&(day.to_string(), period))?;
            // blank cells count as zero, like a spreadsheet sum over the rows
            total += cells.get(&key).copied().unwrap_or(0.0);
        }
        Some(total)
    }

    /// First and last term keys covered by the matrix, for upload summaries.
    pub fn term_span(&self) -> Option<(&str, &str)> {
        match (self.term_keys.first(), self.term_keys.last()) {
            (Some(first), Some(last)) => Some((first.as_str(), last.as_str())),
            _ => None,
        }
    }

    /// Per-weekday attendance sums over the selected periods, one column per
    /// term key of the selected years. Backs the attendance bar chart.
    pub fn weekday_summary(&self, periods: &[i64], years: &[i64]) -> Result<DataFrame> {
        let keys: Vec<&String> = self
            .term_keys
            .iter()
            .filter(|key| {
                parse_term_key(key).is_some_and(|(year, _)| years.contains(&year))
            })
            .collect();
        let mut columns =
            vec![Series::new("weekday", JP_DAYNAMES.iter().copied().collect::<Vec<_>>())];
        for key in keys {
            let sums: Vec<f64> = JP_DAYNAMES
                .iter()
                .map(|day| {
                    periods
                        .iter()
                        .filter_map(|p| self.rows.get(&(day.to_string(), *p)))
                        .filter_map(|cells| cells.get(key.as_str()))
                        .sum()
                })
                .collect();
            columns.push(Series::new(key, sums));
        }
        Ok(DataFrame::new(columns)?)
    }
}

/// The two campus matrices, dispatched by store display name.
#[derive(Debug, Clone)]
pub struct SyllabusPair {
    pub west: Syllabus,
    pub east: Syllabus,
}

impl SyllabusPair {
    pub fn from_frames(west: &DataFrame, east: &DataFrame) -> Result<Self> {
        Ok(SyllabusPair {
            west: Syllabus::from_frame(west)?,
            east: Syllabus::from_frame(east)?,
        })
    }

    /// The campus matrix serving a store, or `None` for unknown stores.
    pub fn for_store(&self, store: &str) -> Option<&Syllabus> {
        match store {
            WEST_STORE => Some(&self.west),
            EAST_STORE => Some(&self.east),
            _ => None,
        }
    }
}

fn parse_term_key(key: &str) -> Option<(i64, usize)> {
    if key.len() < 7 || !key.is_char_boundary(4) {
        return None;
    }
    let (year, term) = key.split_at(4);
    let year: i64 = year.parse().ok()?;
    let term_index = MAIN_TERMS.iter().position(|t| *t == term)?;
    Some((year, term_index))
}

/// Order term keys chronologically: by year, then SPR < SMR < AUT < WTR.
fn sort_term_keys(keys: &mut [String]) {
    keys.sort_by_key(|key| parse_term_key(key).unwrap_or((i64::MAX, usize::MAX)));
}

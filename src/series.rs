//! Daily series assembly
//!
//! Resamples the customer table into one party-size total per day for a store
//! and business-hours window, then outer-joins it with the calendar features
//! and attaches the attendance regressor. The outer join keeps calendar dates
//! with no transactions (future days, zero-customer days) as well as
//! transaction dates outside the calendar range (their calendar features stay
//! null). The result is indexed by date, ascending, one row per day over the
//! union of both ranges.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveTime};
use polars::prelude::*;

use crate::error::{Error, Result};
use crate::io;
use crate::syllabus::Syllabus;

/// Service windows of the cafeterias. Evening checkouts are only partially
/// recorded by the registers, so forecasts are built on the lunch window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusinessHours {
    /// 11:00-14:00
    Lunch,
    /// 17:30-19:30
    Dinner,
    /// 11:00-19:30
    All,
}

impl BusinessHours {
    fn window(self) -> (NaiveTime, NaiveTime) {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap_or_default();
        match self {
            BusinessHours::Lunch => (t(11, 0), t(14, 0)),
            BusinessHours::Dinner => (t(17, 30), t(19, 30)),
            BusinessHours::All => (t(11, 0), t(19, 30)),
        }
    }

    /// Whether a wall-clock time falls inside the window (bounds inclusive).
    pub fn contains(self, time: NaiveTime) -> bool {
        let (start, end) = self.window();
        start <= time && time <= end
    }
}

/// Total party size per day for one store within a business-hours window.
///
/// Days without checkouts between the first and last observed date count as
/// zero; the frame has columns `date` and `customers`, ascending by date.
pub fn daily_customer_counts(
    customers: &DataFrame,
    store: &str,
    hours: BusinessHours,
) -> Result<DataFrame> {
    let stamps = io::datetime_values(customers, "started_at")?;
    let parties = io::i64_values(customers, "party_size")?;
    let locations = io::str_values(customers, "location")?;

    let mut totals: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for ((stamp, party), location) in stamps.iter().zip(&parties).zip(&locations) {
        if location.as_deref() != Some(store) {
            continue;
        }
        let Some(stamp) = stamp else { continue };
        if !hours.contains(stamp.time()) {
            continue;
        }
        *totals.entry(stamp.date()).or_insert(0) += party.unwrap_or(0);
    }
    if totals.is_empty() {
        return Err(Error::EmptyAfterFilter);
    }

    let first = *totals.keys().next().unwrap_or(&NaiveDate::default());
    let last = *totals.keys().last().unwrap_or(&NaiveDate::default());
    let mut dates = Vec::new();
    let mut counts = Vec::new();
    let mut day = first;
    while day <= last {
        dates.push(Some(day));
        counts.push(totals.get(&day).copied().unwrap_or(0));
        day += Duration::days(1);
    }
    Ok(DataFrame::new(vec![
        io::date_series("date", &dates)?,
        Series::new("customers", counts),
    ])?)
}

/// Join the daily counts with the calendar features and attach the attendance
/// regressor per calendar row. Single point of truth for what a trainable row
/// looks like: date, customers, calendar columns, feature columns, syllabus.
pub fn assemble(
    daily: &DataFrame,
    calendar_features: &DataFrame,
    syllabus: &Syllabus,
) -> Result<DataFrame> {
    let years = io::i64_values(calendar_features, "academic_year")?;
    let terms = io::str_values(calendar_features, "term")?;
    let classes = io::str_values(calendar_features, "class")?;

    let attendance: Vec<Option<f64>> = years
        .iter()
        .zip(&terms)
        .zip(&classes)
        .map(|((year, term), class)| {
            match (year, term.as_deref(), class.as_deref()) {
                (Some(year), Some(term), Some(class)) => syllabus.lookup(class, *year, term),
                _ => None,
            }
        })
        .collect();

    let mut calendar = calendar_features.clone();
    calendar.with_column(Series::new("syllabus", attendance))?;

    let joined = daily.join(
        &calendar,
        ["date"],
        ["date"],
        JoinArgs::new(JoinType::Outer),
    )?;
    Ok(joined
        .lazy()
        .sort("date", SortOptions::default())
        .collect()?)
}

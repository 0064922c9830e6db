//! Calendar feature derivation
//!
//! The academic calendar lists one row per date with the term, the class day
//! and free-text info tags. Features derived here: the week-of-term index and
//! the holiday / replaced / first-week / last-week indicator columns.
//!
//! Week numbering counts from the Monday of the first teaching week of a term.
//! SPR and SMR share one continuous counter, as do AUT and WTR: entering SMR or
//! WTR keeps the previous anchor instead of resetting it. The upload contract
//! requires the calendar to start at a term boundary; that precondition is not
//! validated here and a mid-term start corrupts the numbering silently.

use chrono::{Datelike, Duration, NaiveDate};
use polars::prelude::*;

use crate::error::{Error, Result};
use crate::io;

/// The exact column set a calendar upload must carry.
pub const CALENDAR_COLS: [&str; 5] = ["date", "academic_year", "term", "class", "info"];

/// Terms that carry teaching days and therefore a week counter.
const TEACHING_TERMS: [&str; 7] = [
    "SPR",
    "SMR",
    "AUT",
    "WTR",
    "SMRINT",
    "WTRINT1to3",
    "WTRINT4",
];

/// The four main terms with attendance columns in the syllabus matrix.
pub const MAIN_TERMS: [&str; 4] = ["SPR", "SMR", "AUT", "WTR"];

/// Class values that denote a regular teaching weekday.
pub const WEEKDAY_CLASSES: [&str; 5] = ["MON", "TUE", "WED", "THU", "FRI"];

/// Last-week detection only works for terms of exactly this many weeks; a
/// generalized end-of-term detector would need actual term lengths.
pub const DEFAULT_MAX_TERM_WEEKS: i32 = 15;

/// Derive the per-day feature columns from a raw calendar table.
///
/// Appends `nweek`, `holiday`, `replaced`, `first_week` and `last_week` and
/// normalizes the `date` column dtype. Rows are expected in chronological
/// order starting at a term boundary; see the module docs for the caveat.
pub fn build_features(calendar: &DataFrame, max_term_weeks: i32) -> Result<DataFrame> {
    validate_columns(calendar)?;

    let dates = io::date_values(calendar, "date")?;
    if calendar.height() > 0 && dates.iter().any(Option::is_none) {
        return Err(Error::Malformed(
            "calendar contains an unreadable date".to_string(),
        ));
    }
    let dates: Vec<NaiveDate> = dates.into_iter().flatten().collect();
    let terms = io::str_values(calendar, "term")?;
    let classes = io::str_values(calendar, "class")?;
    let infos = io::str_values(calendar, "info")?;

    let nweek = week_of_term(&dates, &terms, &classes);
    let holiday = info_flag(&infos, "Holiday");
    let replaced = info_flag(&infos, "Replaced");
    let first_week: Vec<i32> = nweek
        .iter()
        .map(|w| i32::from(*w == Some(1)))
        .collect();
    let last_week: Vec<i32> = nweek
        .iter()
        .map(|w| i32::from(*w == Some(max_term_weeks)))
        .collect();

    let mut df = calendar.clone();
    let academic_year = df.column("academic_year")?.cast(&DataType::Int64)?;
    df.with_column(academic_year)?;
    io::coerce_date_column(&mut df, "date")?;
    df.with_column(Series::new("nweek", nweek))?;
    df.with_column(Series::new("holiday", holiday))?;
    df.with_column(Series::new("replaced", replaced))?;
    df.with_column(Series::new("first_week", first_week))?;
    df.with_column(Series::new("last_week", last_week))?;
    Ok(df)
}

fn validate_columns(calendar: &DataFrame) -> Result<()> {
    let present = calendar.get_column_names();
    let unexpected: Vec<&str> = present
        .iter()
        .copied()
        .filter(|name| !CALENDAR_COLS.contains(name))
        .collect();
    if !unexpected.is_empty() {
        return Err(Error::Malformed(format!(
            "unexpected calendar columns: {}",
            unexpected.join(", ")
        )));
    }
    let missing: Vec<&str> = CALENDAR_COLS
        .iter()
        .copied()
        .filter(|name| !present.contains(name))
        .collect();
    if !missing.is_empty() {
        return Err(Error::Malformed(format!(
            "missing calendar columns: {}",
            missing.join(", ")
        )));
    }
    Ok(())
}

/// Scan rows in date order and number the teaching weeks of each term.
/// Non-teaching rows (vacation terms, NoClass days) get no week number.
fn week_of_term(
    dates: &[NaiveDate],
    terms: &[Option<String>],
    classes: &[Option<String>],
) -> Vec<Option<i32>> {
    let mut current_term = String::new();
    let mut anchor: Option<NaiveDate> = None;
    let mut nweek = Vec::with_capacity(dates.len());
    for i in 0..dates.len() {
        let term = terms[i].as_deref().unwrap_or("");
        let class = classes[i].as_deref().unwrap_or("");
        if TEACHING_TERMS.contains(&term) && class != "NoClass" {
            if current_term != term {
                // SPR->SMR and AUT->WTR share one week counter: keep the anchor
                if term != "SMR" && term != "WTR" {
                    let weekday = dates[i].weekday().num_days_from_monday();
                    anchor = Some(dates[i] - Duration::days(i64::from(weekday)));
                }
                current_term = term.to_string();
            }
            nweek.push(anchor.map(|a| ((dates[i] - a).num_days() / 7 + 1) as i32));
        } else {
            nweek.push(None);
        }
    }
    nweek
}

fn info_flag(infos: &[Option<String>], tag: &str) -> Vec<i32> {
    infos
        .iter()
        .map(|info| i32::from(info.as_deref().is_some_and(|v| v.contains(tag))))
        .collect()
}

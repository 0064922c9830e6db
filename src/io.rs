//! Table I/O at the upload/download boundary, plus typed column coercion
//!
//! The register exports use a legacy Shift-JIS encoding; everything is decoded
//! to UTF-8 before Polars sees it, and download artifacts are encoded back.
//! The coercion helpers convert between chrono values and the physical
//! representation of Polars Date/Datetime columns so that the pipeline stages
//! can run their row scans on plain chrono types.

use std::io::Cursor;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use encoding_rs::SHIFT_JIS;
use polars::prelude::*;

use crate::error::{Error, Result};

/// Decode a Shift-JIS encoded CSV extract into a DataFrame.
pub fn read_sjis_csv(bytes: &[u8]) -> Result<DataFrame> {
    let (decoded, _, had_errors) = SHIFT_JIS.decode(bytes);
    if had_errors {
        return Err(Error::Malformed("input is not valid Shift-JIS".to_string()));
    }
    read_csv_str(&decoded)
}

/// Read a UTF-8 encoded CSV into a DataFrame.
pub fn read_utf8_csv(bytes: &[u8]) -> Result<DataFrame> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| Error::Malformed("input is not valid UTF-8".to_string()))?;
    read_csv_str(text)
}

fn read_csv_str(text: &str) -> Result<DataFrame> {
    CsvReader::new(Cursor::new(text.as_bytes().to_vec()))
        .has_header(true)
        .finish()
        .map_err(|e| Error::Malformed(e.to_string()))
}

/// Serialize a table to delimited text in the legacy Shift-JIS encoding.
///
/// Characters without a Shift-JIS representation are replaced by the encoder;
/// the exports only carry ASCII and JIS text so this does not occur in practice.
pub fn write_sjis_csv(df: &mut DataFrame) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    CsvWriter::new(&mut buf).include_header(true).finish(df)?;
    let text = String::from_utf8(buf)
        .map_err(|_| Error::Malformed("serialized table is not valid UTF-8".to_string()))?;
    let (encoded, _, _) = SHIFT_JIS.encode(&text);
    Ok(encoded.into_owned())
}

fn to_epoch_days(date: NaiveDate) -> i32 {
    (date - NaiveDate::default()).num_days() as i32
}

fn from_epoch_days(days: i32) -> NaiveDate {
    NaiveDate::default() + Duration::days(i64::from(days))
}

/// Build a Date series from chrono dates.
pub fn date_series(name: &str, dates: &[Option<NaiveDate>]) -> Result<Series> {
    let days: Vec<Option<i32>> = dates.iter().map(|o| o.map(to_epoch_days)).collect();
    Ok(Series::new(name, days).cast(&DataType::Date)?)
}

/// Build a timezone-naive millisecond Datetime series from chrono timestamps.
pub fn datetime_series(name: &str, stamps: &[Option<NaiveDateTime>]) -> Result<Series> {
    let millis: Vec<Option<i64>> = stamps
        .iter()
        .map(|o| o.map(|dt| dt.and_utc().timestamp_millis()))
        .collect();
    Ok(Series::new(name, millis).cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?)
}

/// Extract a column as chrono dates. Accepts Date, Datetime or text columns;
/// unparseable text becomes null.
pub fn date_values(df: &DataFrame, name: &str) -> Result<Vec<Option<NaiveDate>>> {
    let s = df.column(name)?;
    match s.dtype() {
        DataType::Date => Ok(s
            .cast(&DataType::Int32)?
            .i32()?
            .into_iter()
            .map(|o| o.map(from_epoch_days))
            .collect()),
        DataType::Datetime(_, _) => Ok(datetime_values(df, name)?
            .into_iter()
            .map(|o| o.map(|dt| dt.date()))
            .collect()),
        DataType::Utf8 => Ok(s.utf8()?.into_iter().map(|o| o.and_then(parse_date)).collect()),
        dt => Err(Error::Malformed(format!(
            "column `{name}` has no date representation (found {dt})"
        ))),
    }
}

/// Extract a column as chrono timestamps. Accepts Datetime or text columns.
pub fn datetime_values(df: &DataFrame, name: &str) -> Result<Vec<Option<NaiveDateTime>>> {
    let s = df.column(name)?;
    match s.dtype() {
        DataType::Datetime(unit, _) => {
            let factor = match unit {
                TimeUnit::Nanoseconds => 1_000_000,
                TimeUnit::Microseconds => 1_000,
                TimeUnit::Milliseconds => 1,
            };
            Ok(s.cast(&DataType::Int64)?
                .i64()?
                .into_iter()
                .map(|o| {
                    o.and_then(|v| DateTime::from_timestamp_millis(v / factor))
                        .map(|dt| dt.naive_utc())
                })
                .collect())
        }
        DataType::Utf8 => Ok(s
            .utf8()?
            .into_iter()
            .map(|o| o.and_then(parse_datetime))
            .collect()),
        dt => Err(Error::Malformed(format!(
            "column `{name}` has no timestamp representation (found {dt})"
        ))),
    }
}

/// Replace a raw timestamp column with a timezone-naive Datetime column.
pub fn coerce_datetime_column(df: &mut DataFrame, name: &str) -> Result<()> {
    let stamps = datetime_values(df, name)?;
    let series = datetime_series(name, &stamps)?;
    df.with_column(series)?;
    Ok(())
}

/// Replace a raw date column with a Date column.
pub fn coerce_date_column(df: &mut DataFrame, name: &str) -> Result<()> {
    let dates = date_values(df, name)?;
    let series = date_series(name, &dates)?;
    df.with_column(series)?;
    Ok(())
}

/// Extract a column as owned strings; full-null columns of any dtype are
/// tolerated (spreadsheet exports leave free-text columns entirely blank).
pub fn str_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let s = df.column(name)?;
    match s.dtype() {
        DataType::Utf8 => Ok(s.utf8()?.into_iter().map(|o| o.map(str::to_string)).collect()),
        DataType::Null => Ok(vec![None; s.len()]),
        _ => Ok(s
            .cast(&DataType::Utf8)?
            .utf8()?
            .into_iter()
            .map(|o| o.map(str::to_string))
            .collect()),
    }
}

/// Extract a column as 64-bit integers, casting numeric dtypes as needed.
pub fn i64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    Ok(df
        .column(name)?
        .cast(&DataType::Int64)?
        .i64()?
        .into_iter()
        .collect())
}

/// Extract a column as floats, casting numeric dtypes as needed.
pub fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    Ok(df
        .column(name)?
        .cast(&DataType::Float64)?
        .f64()?
        .into_iter()
        .collect())
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw.trim(), fmt) {
            return Some(date);
        }
    }
    None
}

fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    // Exported timestamps carry a +09:00 offset; keep the wall-clock time.
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    for fmt in [
        "%Y-%m-%d %H:%M:%S",
        "%Y/%m/%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    None
}

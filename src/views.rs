//! Derived tables for the presentation layer
//!
//! Each view takes the normalized tables plus an explicit filter struct; the
//! caller (the excluded UI layer) supplies the date range, store, business
//! hours and aggregation mode and renders whatever table comes back. Nothing
//! here reads ambient state.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use polars::prelude::*;

use crate::error::{Error, Result};
use crate::io;
use crate::pos::{EAST_STORE, WEST_STORE};
use crate::series::BusinessHours;

/// Filter parameters shared by every view. The date range is inclusive.
#[derive(Debug, Clone)]
pub struct ViewFilter {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// `None` selects every store.
    pub store: Option<String>,
    pub hours: BusinessHours,
}

impl ViewFilter {
    fn keeps(&self, stamp: &Option<NaiveDateTime>, location: &Option<String>) -> bool {
        let Some(stamp) = stamp else { return false };
        if stamp.date() < self.start || stamp.date() > self.end {
            return false;
        }
        if !self.hours.contains(stamp.time()) {
            return false;
        }
        match &self.store {
            Some(store) => location.as_deref() == Some(store.as_str()),
            None => true,
        }
    }
}

/// How item and department sales are aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Quantity,
    Amount,
}

impl Aggregation {
    fn column(self) -> &'static str {
        match self {
            Aggregation::Quantity => "quantity",
            Aggregation::Amount => "amount",
        }
    }
}

/// Which line-item field identifies a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemField {
    Name,
    Barcode,
    Sku,
}

impl ItemField {
    fn column(self) -> &'static str {
        match self {
            ItemField::Name => "name",
            ItemField::Barcode => "barcode",
            ItemField::Sku => "sku",
        }
    }
}

/// Customer counts bucketed by time of day, one column per date.
///
/// Rows are `span_minutes` buckets covering the business-hours window; every
/// cell inside the window is filled, zero when nothing was sold.
pub fn time_of_day_series(
    customers: &DataFrame,
    filter: &ViewFilter,
    span_minutes: u32,
) -> Result<DataFrame> {
    if span_minutes == 0 || span_minutes > 24 * 60 {
        return Err(Error::Malformed(format!(
            "unusable resample span of {span_minutes} minutes"
        )));
    }
    let stamps = io::datetime_values(customers, "started_at")?;
    let parties = io::i64_values(customers, "party_size")?;
    let locations = io::str_values(customers, "location")?;

    let mut cells: BTreeMap<(NaiveTime, NaiveDate), i64> = BTreeMap::new();
    let mut dates: Vec<NaiveDate> = Vec::new();
    for ((stamp, party), location) in stamps.iter().zip(&parties).zip(&locations) {
        if !filter.keeps(stamp, location) {
            continue;
        }
        let stamp = stamp.unwrap_or_default();
        let minutes = (stamp.time().hour() * 60 + stamp.time().minute()) / span_minutes
            * span_minutes;
        let bucket = NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0).unwrap_or_default();
        *cells.entry((bucket, stamp.date())).or_insert(0) += party.unwrap_or(0);
        if !dates.contains(&stamp.date()) {
            dates.push(stamp.date());
        }
    }
    if cells.values().sum::<i64>() == 0 {
        return Err(Error::EmptyAfterFilter);
    }
    dates.sort();

    // every bucket of the window becomes a row, sold or not
    let mut buckets = Vec::new();
    let mut minutes = 0u32;
    while minutes < 24 * 60 {
        let bucket = NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0).unwrap_or_default();
        if filter.hours.contains(bucket) {
            buckets.push(bucket);
        }
        minutes += span_minutes;
    }

    let mut columns = vec![Series::new(
        "time",
        buckets
            .iter()
            .map(|b| b.format("%H:%M").to_string())
            .collect::<Vec<_>>(),
    )];
    for date in &dates {
        let counts: Vec<i64> = buckets
            .iter()
            .map(|b| cells.get(&(*b, *date)).copied().unwrap_or(0))
            .collect();
        columns.push(Series::new(&date.format("%Y-%m-%d").to_string(), counts));
    }
    Ok(DataFrame::new(columns)?)
}

/// Daily customer totals, one column per store present in the filtered rows.
/// Dates outside a store's own observed span stay null for that store.
pub fn daily_series(customers: &DataFrame, filter: &ViewFilter) -> Result<DataFrame> {
    let stamps = io::datetime_values(customers, "started_at")?;
    let parties = io::i64_values(customers, "party_size")?;
    let locations = io::str_values(customers, "location")?;

    let mut per_store: BTreeMap<String, BTreeMap<NaiveDate, i64>> = BTreeMap::new();
    for ((stamp, party), location) in stamps.iter().zip(&parties).zip(&locations) {
        if !filter.keeps(stamp, location) {
            continue;
        }
        let Some(location) = location else { continue };
        let date = stamp.unwrap_or_default().date();
        *per_store
            .entry(location.clone())
            .or_default()
            .entry(date)
            .or_insert(0) += party.unwrap_or(0);
    }
    if per_store.is_empty() {
        return Err(Error::EmptyAfterFilter);
    }

    let first = per_store.values().filter_map(|m| m.keys().next()).min();
    let last = per_store.values().filter_map(|m| m.keys().last()).max();
    let (Some(first), Some(last)) = (first, last) else {
        return Err(Error::EmptyAfterFilter);
    };
    let mut dates = Vec::new();
    let mut day = *first;
    while day <= *last {
        dates.push(Some(day));
        day += chrono::Duration::days(1);
    }

    let mut columns = vec![io::date_series("date", &dates)?];
    for store in store_order(per_store.keys()) {
        let totals = &per_store[&store];
        let span = (
            *totals.keys().next().unwrap_or(first),
            *totals.keys().last().unwrap_or(last),
        );
        let counts: Vec<Option<i64>> = dates
            .iter()
            .map(|date| {
                let date = date.unwrap_or_default();
                if date < span.0 || date > span.1 {
                    None
                } else {
                    Some(totals.get(&date).copied().unwrap_or(0))
                }
            })
            .collect();
        columns.push(Series::new(&store, counts));
    }
    Ok(DataFrame::new(columns)?)
}

/// Total party size per payment method over the filtered rows. Checkouts with
/// several methods count once per method, so the column sum can exceed the
/// total number of customers.
pub fn payment_method_totals(customers: &DataFrame, filter: &ViewFilter) -> Result<DataFrame> {
    const BASE_COLS: [&str; 6] = [
        "location",
        "checkout_id",
        "started_at",
        "completed_at",
        "amount",
        "party_size",
    ];
    let stamps = io::datetime_values(customers, "started_at")?;
    let parties = io::i64_values(customers, "party_size")?;
    let locations = io::str_values(customers, "location")?;
    let keep: Vec<bool> = stamps
        .iter()
        .zip(&locations)
        .map(|(stamp, location)| filter.keeps(stamp, location))
        .collect();

    let methods: Vec<&str> = customers
        .get_column_names()
        .into_iter()
        .filter(|name| !BASE_COLS.contains(name))
        .collect();
    let mut totals = Vec::with_capacity(methods.len());
    for method in &methods {
        let indicators = io::i64_values(customers, method)?;
        let total: i64 = indicators
            .iter()
            .zip(&parties)
            .zip(&keep)
            .filter(|(_, keep)| **keep)
            .map(|((indicator, party), _)| {
                if indicator.unwrap_or(0) > 0 {
                    party.unwrap_or(0)
                } else {
                    0
                }
            })
            .sum();
        totals.push(total);
    }
    Ok(df!(
        "method" => methods,
        "total_customers" => totals,
    )?)
}

/// Daily sales series for one product, selected by name, barcode or SKU.
pub fn item_sales(
    items: &DataFrame,
    filter: &ViewFilter,
    field: ItemField,
    value: &str,
    aggregation: Aggregation,
) -> Result<DataFrame> {
    keyed_daily_sales(items, filter, field.column(), value, aggregation)
}

/// Daily sales series for one department.
pub fn department_sales(
    items: &DataFrame,
    filter: &ViewFilter,
    department: &str,
    aggregation: Aggregation,
) -> Result<DataFrame> {
    keyed_daily_sales(items, filter, "department", department, aggregation)
}

/// Distinct values of an item field among the filtered rows, in row order.
/// Feeds the selection widget of the item sales view.
pub fn item_candidates(
    items: &DataFrame,
    filter: &ViewFilter,
    field: ItemField,
) -> Result<Vec<String>> {
    column_candidates(items, filter, field.column())
}

/// Distinct departments among the filtered rows, in row order.
pub fn department_candidates(items: &DataFrame, filter: &ViewFilter) -> Result<Vec<String>> {
    column_candidates(items, filter, "department")
}

fn column_candidates(items: &DataFrame, filter: &ViewFilter, column: &str) -> Result<Vec<String>> {
    let stamps = io::datetime_values(items, "started_at")?;
    let locations = io::str_values(items, "location")?;
    let values = io::str_values(items, column)?;
    let mut candidates = Vec::new();
    for ((stamp, location), value) in stamps.iter().zip(&locations).zip(&values) {
        if !filter.keeps(stamp, location) {
            continue;
        }
        if let Some(value) = value {
            if !candidates.contains(value) {
                candidates.push(value.clone());
            }
        }
    }
    Ok(candidates)
}

fn keyed_daily_sales(
    items: &DataFrame,
    filter: &ViewFilter,
    key_column: &str,
    key: &str,
    aggregation: Aggregation,
) -> Result<DataFrame> {
    let stamps = io::datetime_values(items, "started_at")?;
    let locations = io::str_values(items, "location")?;
    let keys = io::str_values(items, key_column)?;
    let values = io::i64_values(items, aggregation.column())?;

    let mut totals: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for (((stamp, location), row_key), value) in
        stamps.iter().zip(&locations).zip(&keys).zip(&values)
    {
        if !filter.keeps(stamp, location) || row_key.as_deref() != Some(key) {
            continue;
        }
        *totals
            .entry(stamp.unwrap_or_default().date())
            .or_insert(0) += value.unwrap_or(0);
    }
    if totals.is_empty() {
        return Err(Error::EmptyAfterFilter);
    }

    let dates: Vec<Option<NaiveDate>> = totals.keys().map(|d| Some(*d)).collect();
    let sums: Vec<i64> = totals.values().copied().collect();
    Ok(DataFrame::new(vec![
        io::date_series("date", &dates)?,
        Series::new("total", sums),
    ])?)
}

/// West store first, then east, then anything else alphabetically.
fn store_order<'a>(keys: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut stores: Vec<String> = keys.cloned().collect();
    stores.sort_by_key(|store| match store.as_str() {
        WEST_STORE => (0, String::new()),
        EAST_STORE => (1, String::new()),
        other => (2, other.to_string()),
    });
    stores
}

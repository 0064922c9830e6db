//! Schema normalization for raw POS extracts
//!
//! The register exports three flat tables per batch (checkouts, line items and
//! payments) with locale-specific headers. Cleanup reduces them to two derived
//! tables: one row per valid checkout joined with one-hot payment indicators
//! (`customers`), and the line items joined with the checkout timestamps
//! (`items`). Cancelled checkouts and checkouts containing a non-positive item
//! quantity are removed from every table.

use chrono::NaiveDate;
use polars::prelude::*;

use crate::error::{Error, Result};
use crate::io;

/// Display name for the west cafeteria register account.
pub const WEST_STORE: &str = "西食堂";
/// Display name for the east cafeteria register account.
pub const EAST_STORE: &str = "東カフェテリア";

/// Register account ids mapped to display names. Unknown ids pass through.
const ACCOUNT_NAMES: [(&str, &str); 2] = [("ub396203", WEST_STORE), ("ub396207", EAST_STORE)];

const CHECKOUT_COLS: [(&str, &str); 7] = [
    ("アカウント名", "location"),
    ("会計ID", "checkout_id"),
    ("開始日時", "started_at"),
    ("会計日時", "completed_at"),
    ("削除日時", "cancelled_at"),
    ("金額", "amount"),
    ("客数", "party_size"),
];

const ITEM_COLS: [(&str, &str); 7] = [
    ("会計ID", "checkout_id"),
    ("SKU", "sku"),
    ("バーコード", "barcode"),
    ("名前", "name"),
    ("数量", "quantity"),
    ("金額", "amount"),
    ("部門", "department"),
];

const PAYMENT_COLS: [(&str, &str); 2] = [("会計ID", "checkout_id"), ("支払い方法", "method")];

const CHECKOUT_CASTS: [(&str, DataType); 5] = [
    ("location", DataType::Utf8),
    ("checkout_id", DataType::Utf8),
    ("cancelled_at", DataType::Utf8),
    ("amount", DataType::Int64),
    ("party_size", DataType::Int64),
];

const ITEM_CASTS: [(&str, DataType); 7] = [
    ("checkout_id", DataType::Utf8),
    ("sku", DataType::Utf8),
    ("barcode", DataType::Utf8),
    ("name", DataType::Utf8),
    ("quantity", DataType::Int64),
    ("amount", DataType::Int64),
    ("department", DataType::Utf8),
];

const PAYMENT_CASTS: [(&str, DataType); 2] =
    [("checkout_id", DataType::Utf8), ("method", DataType::Utf8)];

/// Cleaned POS tables: one row per valid checkout, and its line items.
#[derive(Debug)]
pub struct PosTables {
    /// One row per valid checkout with one-hot payment indicator columns.
    pub customers: DataFrame,
    /// Line items joined with the checkout location and timestamps.
    pub items: DataFrame,
}

/// Normalize raw checkout/item/payment batches into customer and item tables.
///
/// # Arguments
/// * `checkouts`, `items`, `payments` - raw extract batches, concatenated in order
///
/// # Errors
/// * `Malformed` when a batch lacks one of the expected headers
/// * `EmptyAfterFilter` when the input holds no rows at all, or no checkout
///   survives the cleanup
pub fn normalize(
    checkouts: &[DataFrame],
    items: &[DataFrame],
    payments: &[DataFrame],
) -> Result<PosTables> {
    let checkouts = dedup(concat_batches(checkouts, &CHECKOUT_COLS, &CHECKOUT_CASTS)?)?;
    let items = dedup(concat_batches(items, &ITEM_COLS, &ITEM_CASTS)?)?;
    let payments = dedup(concat_batches(payments, &PAYMENT_COLS, &PAYMENT_CASTS)?)?;

    // A non-null cancellation timestamp voids the checkout everywhere.
    let cancelled = checkouts
        .filter(&checkouts.column("cancelled_at")?.is_not_null())?
        .column("checkout_id")?
        .clone();
    let checkouts = drop_ids(checkouts, &cancelled)?.drop("cancelled_at")?;
    let items = drop_ids(items, &cancelled)?;
    let payments = drop_ids(payments, &cancelled)?;

    // A blank payment method is a correction of the method, not a payment.
    let payments = payments.filter(&payments.column("method")?.is_not_null())?;

    // A non-positive quantity marks the whole transaction as invalid.
    let invalid = items
        .clone()
        .lazy()
        .filter(col("quantity").lt_eq(lit(0)))
        .select([col("checkout_id")])
        .collect()?
        .column("checkout_id")?
        .clone();
    let checkouts = drop_ids(checkouts, &invalid)?;
    let items = drop_ids(items, &invalid)?;
    let payments = drop_ids(payments, &invalid)?;

    let mut checkouts = rename_accounts(checkouts)?;
    io::coerce_datetime_column(&mut checkouts, "started_at")?;
    io::coerce_datetime_column(&mut checkouts, "completed_at")?;

    let payments = one_hot_payments(&payments)?;

    let customers = checkouts.join(
        &payments,
        ["checkout_id"],
        ["checkout_id"],
        JoinArgs::new(JoinType::Inner),
    )?;
    if customers.height() == 0 {
        return Err(Error::EmptyAfterFilter);
    }
    let item_keys = customers.select(["location", "checkout_id", "started_at", "completed_at"])?;
    let items = item_keys.join(
        &items,
        ["checkout_id"],
        ["checkout_id"],
        JoinArgs::new(JoinType::Inner),
    )?;

    Ok(PosTables { customers, items })
}

/// Observed [min, max] completion dates for one store, for upload summaries.
pub fn date_span(customers: &DataFrame, store: &str) -> Result<Option<(NaiveDate, NaiveDate)>> {
    let stamps = io::datetime_values(customers, "completed_at")?;
    let locations = customers.column("location")?.utf8()?;
    let mut span: Option<(NaiveDate, NaiveDate)> = None;
    for (loc, stamp) in locations.into_iter().zip(stamps) {
        if loc != Some(store) {
            continue;
        }
        if let Some(date) = stamp.map(|dt| dt.date()) {
            span = Some(match span {
                None => (date, date),
                Some((lo, hi)) => (lo.min(date), hi.max(date)),
            });
        }
    }
    Ok(span)
}

fn select_and_rename(df: &DataFrame, columns: &[(&str, &str)]) -> Result<DataFrame> {
    let present = df.get_column_names();
    let missing: Vec<&str> = columns
        .iter()
        .map(|(raw, _)| *raw)
        .filter(|raw| !present.contains(raw))
        .collect();
    if !missing.is_empty() {
        return Err(Error::Malformed(format!(
            "missing expected columns: {}",
            missing.join(", ")
        )));
    }
    let mut out = df.select(columns.iter().map(|(raw, _)| *raw))?;
    for (raw, canonical) in columns {
        out.rename(raw, canonical)?;
    }
    Ok(out)
}

fn cast_columns(df: &mut DataFrame, casts: &[(&str, DataType)]) -> Result<()> {
    for (name, dtype) in casts {
        let cast = df.column(name)?.cast(dtype)?;
        df.with_column(cast)?;
    }
    Ok(())
}

/// Concatenate batches, keeping only the required columns under canonical
/// names. Empty batches are skipped; nothing but empty batches is an error.
fn concat_batches(
    batches: &[DataFrame],
    columns: &[(&str, &str)],
    casts: &[(&str, DataType)],
) -> Result<DataFrame> {
    let mut merged: Option<DataFrame> = None;
    for batch in batches {
        if batch.height() == 0 {
            continue;
        }
        let mut selected = select_and_rename(batch, columns)?;
        cast_columns(&mut selected, casts)?;
        merged = Some(match merged {
            Some(mut acc) => {
                acc.vstack_mut(&selected)?;
                acc
            }
            None => selected,
        });
    }
    merged.ok_or(Error::EmptyAfterFilter)
}

/// Exact-duplicate rows appear when overlapping exports are uploaded together.
fn dedup(df: DataFrame) -> Result<DataFrame> {
    Ok(df
        .lazy()
        .unique_stable(None, UniqueKeepStrategy::First)
        .collect()?)
}

fn drop_ids(df: DataFrame, ids: &Series) -> Result<DataFrame> {
    if ids.is_empty() {
        return Ok(df);
    }
    Ok(df
        .lazy()
        .filter(col("checkout_id").is_in(lit(ids.clone())).not())
        .collect()?)
}

fn display_name(raw: &str) -> &str {
    ACCOUNT_NAMES
        .iter()
        .find(|(id, _)| *id == raw)
        .map(|(_, name)| *name)
        .unwrap_or(raw)
}

fn rename_accounts(mut checkouts: DataFrame) -> Result<DataFrame> {
    let renamed = {
        let location = checkouts.column("location")?.utf8()?;
        let values: Vec<Option<String>> = location
            .into_iter()
            .map(|o| o.map(|v| display_name(v).to_string()))
            .collect();
        Series::new("location", values)
    };
    checkouts.with_column(renamed)?;
    Ok(checkouts)
}

/// One-hot-encode payment methods and aggregate per checkout by summation,
/// never by max: a checkout can combine several payment methods and each
/// indicator must survive.
fn one_hot_payments(payments: &DataFrame) -> Result<DataFrame> {
    let methods = payments.column("method")?.utf8()?;
    let mut names: Vec<String> = methods.into_iter().flatten().map(str::to_string).collect();
    names.sort();
    names.dedup();
    let aggs: Vec<Expr> = names
        .iter()
        .map(|m| {
            col("method")
                .eq(lit(m.as_str()))
                .cast(DataType::Int32)
                .sum()
                .alias(m)
        })
        .collect();
    Ok(payments
        .clone()
        .lazy()
        .group_by([col("checkout_id")])
        .agg(aggs)
        .collect()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkouts_df() -> DataFrame {
        df!(
            "アカウント名" => ["ub396203", "ub396203", "ub396207"],
            "会計ID" => ["A", "B", "C"],
            "開始日時" => ["2024-04-01 11:10:00", "2024-04-01 12:00:00", "2024-04-01 12:30:00"],
            "会計日時" => ["2024-04-01 11:15:00", "2024-04-01 12:05:00", "2024-04-01 12:35:00"],
            "削除日時" => [None::<&str>, Some("2024-04-02 09:00:00"), None],
            "金額" => [500i64, 700, 900],
            "客数" => [3i64, 5, 2],
        )
        .unwrap()
    }

    fn items_df() -> DataFrame {
        df!(
            "会計ID" => ["A", "B", "C"],
            "SKU" => ["s1", "s2", "s3"],
            "バーコード" => ["111", "222", "333"],
            "名前" => ["カレー", "ラーメン", "うどん"],
            "数量" => [1i64, 1, 2],
            "金額" => [500i64, 700, 900],
            "部門" => ["定食", "麺類", "麺類"],
        )
        .unwrap()
    }

    fn payments_df() -> DataFrame {
        df!(
            "会計ID" => ["A", "A", "B", "C"],
            "支払い方法" => [Some("現金"), Some("クレジット"), Some("現金"), Some("現金")],
        )
        .unwrap()
    }

    fn id_row(df: &DataFrame, id: &str) -> Option<usize> {
        df.column("checkout_id")
            .unwrap()
            .utf8()
            .unwrap()
            .into_iter()
            .position(|v| v == Some(id))
    }

    #[test]
    fn cancellation_cascades_to_all_tables() {
        let tables =
            normalize(&[checkouts_df()], &[items_df()], &[payments_df()]).unwrap();
        // B carries a cancellation timestamp and must not survive anywhere
        assert!(id_row(&tables.customers, "B").is_none());
        assert!(id_row(&tables.items, "B").is_none());
        assert!(id_row(&tables.customers, "A").is_some());
        assert!(id_row(&tables.customers, "C").is_some());
        // and no surviving row keeps a cancellation column
        assert!(!tables.customers.get_column_names().contains(&"cancelled_at"));
    }

    #[test]
    fn dedup_makes_repeated_batches_idempotent() {
        let once = normalize(&[checkouts_df()], &[items_df()], &[payments_df()]).unwrap();
        let twice = normalize(
            &[checkouts_df(), checkouts_df()],
            &[items_df(), items_df()],
            &[payments_df(), payments_df()],
        )
        .unwrap();
        assert_eq!(once.customers.shape(), twice.customers.shape());
        assert_eq!(once.items.shape(), twice.items.shape());
        // indicator sums must not double either
        let row = id_row(&twice.customers, "A").unwrap();
        let cash = twice.customers.column("現金").unwrap().i32().unwrap();
        assert_eq!(cash.get(row), Some(1));
    }

    #[test]
    fn multi_method_checkout_keeps_both_indicators() {
        let tables =
            normalize(&[checkouts_df()], &[items_df()], &[payments_df()]).unwrap();
        let row = id_row(&tables.customers, "A").unwrap();
        let cash = tables.customers.column("現金").unwrap().i32().unwrap();
        let card = tables.customers.column("クレジット").unwrap().i32().unwrap();
        assert_eq!(cash.get(row), Some(1));
        assert_eq!(card.get(row), Some(1));
        // C paid cash only
        let row_c = id_row(&tables.customers, "C").unwrap();
        assert_eq!(cash.get(row_c), Some(1));
        assert_eq!(card.get(row_c), Some(0));
    }

    #[test]
    fn non_positive_quantity_removes_whole_checkout() {
        let items = df!(
            "会計ID" => ["A", "A", "C"],
            "SKU" => ["s1", "s2", "s3"],
            "バーコード" => ["111", "222", "333"],
            "名前" => ["カレー", "サラダ", "うどん"],
            "数量" => [1i64, -1, 2],
            "金額" => [500i64, -200, 900],
            "部門" => ["定食", "定食", "麺類"],
        )
        .unwrap();
        let tables = normalize(&[checkouts_df()], &[items], &[payments_df()]).unwrap();
        assert!(id_row(&tables.customers, "A").is_none());
        assert!(id_row(&tables.items, "A").is_none());
        assert!(id_row(&tables.customers, "C").is_some());
    }

    #[test]
    fn account_ids_become_display_names() {
        let tables =
            normalize(&[checkouts_df()], &[items_df()], &[payments_df()]).unwrap();
        let locations: Vec<Option<&str>> = tables
            .customers
            .column("location")
            .unwrap()
            .utf8()
            .unwrap()
            .into_iter()
            .collect();
        assert!(locations.contains(&Some(WEST_STORE)));
        assert!(locations.contains(&Some(EAST_STORE)));
    }

    #[test]
    fn missing_headers_are_malformed() {
        let bad = df!("何か別の列" => ["x"]).unwrap();
        let result = normalize(&[bad], &[items_df()], &[payments_df()]);
        assert!(matches!(result, Err(Error::Malformed(_))));
    }

    #[test]
    fn empty_batches_are_no_usable_data() {
        let result = normalize(&[], &[items_df()], &[payments_df()]);
        assert!(matches!(result, Err(Error::EmptyAfterFilter)));
    }

    #[test]
    fn date_span_reports_per_store_range() {
        let tables =
            normalize(&[checkouts_df()], &[items_df()], &[payments_df()]).unwrap();
        let span = date_span(&tables.customers, WEST_STORE).unwrap().unwrap();
        assert_eq!(span.0, NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());
        assert_eq!(span.1, NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());
        assert!(date_span(&tables.customers, "unknown").unwrap().is_none());
    }
}

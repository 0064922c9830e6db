//! Integration tests for POScope

use std::fs;
use std::io::Write;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use polars::prelude::*;
use tempfile::NamedTempFile;

use poscope::{io, normalize, BusinessHours, Workspace};

const WEST: &str = "西食堂";

/// Consecutive teaching weekdays starting on Monday 2024-04-01.
fn teaching_days(n: usize) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(n);
    let mut day = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
    while days.len() < n {
        if day.weekday() != Weekday::Sat && day.weekday() != Weekday::Sun {
            days.push(day);
        }
        day += Duration::days(1);
    }
    days
}

fn class_label(day: NaiveDate) -> &'static str {
    match day.weekday() {
        Weekday::Mon => "MON",
        Weekday::Tue => "TUE",
        Weekday::Wed => "WED",
        Weekday::Thu => "THU",
        Weekday::Fri => "FRI",
        _ => "NoClass",
    }
}

fn attendance_matrix() -> DataFrame {
    let days: Vec<&str> = ["月", "火", "水", "木", "金"]
        .iter()
        .flat_map(|d| vec![*d; 3])
        .collect();
    let periods: Vec<i64> = vec![1, 2, 3, 1, 2, 3, 1, 2, 3, 1, 2, 3, 1, 2, 3];
    let weekday_sums = [120.0, 90.0, 150.0, 60.0, 100.0];
    let counts: Vec<f64> = weekday_sums
        .iter()
        .flat_map(|total| vec![total / 3.0; 3])
        .collect();
    df!(
        "曜日" => days,
        "時限" => periods,
        "2024SPR" => counts,
    )
    .unwrap()
}

#[test]
fn cancelled_checkouts_vanish_from_the_daily_series() {
    // two checkouts on the same Monday, one of them cancelled
    let checkouts = df!(
        "アカウント名" => ["ub396203", "ub396203"],
        "会計ID" => ["A", "B"],
        "開始日時" => ["2024-04-08 11:30:00", "2024-04-08 12:00:00"],
        "会計日時" => ["2024-04-08 11:35:00", "2024-04-08 12:05:00"],
        "削除日時" => [None::<&str>, Some("2024-04-08 12:06:00")],
        "金額" => [500i64, 900],
        "客数" => [3i64, 5],
    )
    .unwrap();
    let items = df!(
        "会計ID" => ["A", "B"],
        "SKU" => ["s1", "s2"],
        "バーコード" => ["111", "222"],
        "名前" => ["カレー", "ラーメン"],
        "数量" => [1i64, 1],
        "金額" => [500i64, 900],
        "部門" => ["定食", "麺類"],
    )
    .unwrap();
    let payments = df!(
        "会計ID" => ["A", "B"],
        "支払い方法" => ["現金", "現金"],
    )
    .unwrap();

    let tables = normalize(&[checkouts], &[items], &[payments]).unwrap();
    assert_eq!(tables.customers.height(), 1);
    assert_eq!(tables.items.height(), 1);

    let mut workspace = Workspace::new();
    let calendar = df!(
        "date" => ["2024-04-08"],
        "academic_year" => [2024i64],
        "term" => ["SPR"],
        "class" => ["MON"],
        "info" => [None::<&str>],
    )
    .unwrap();
    workspace.load_calendar(&calendar, 15).unwrap();
    let matrix = attendance_matrix();
    workspace.load_syllabus(&matrix, &matrix).unwrap();

    // only the surviving checkout counts: 3 customers, attendance 120 on Monday
    let daily = poscope::series::daily_customer_counts(
        &tables.customers,
        WEST,
        BusinessHours::Lunch,
    )
    .unwrap();
    let assembled = poscope::series::assemble(
        &daily,
        workspace.calendar().unwrap(),
        &workspace.syllabus().unwrap().west,
    )
    .unwrap();
    assert_eq!(assembled.height(), 1);
    let customers: Vec<Option<i64>> = assembled
        .column("customers")
        .unwrap()
        .i64()
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(customers, vec![Some(3)]);
    let syllabus: Vec<Option<f64>> = assembled
        .column("syllabus")
        .unwrap()
        .f64()
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(syllabus, vec![Some(120.0)]);
}

#[test]
fn full_forecast_run_over_a_term() {
    // five observed weeks of lunches plus one future calendar week
    let days = teaching_days(30);
    let observed = &days[..25];

    let mut ids = Vec::new();
    let mut starts = Vec::new();
    let mut ends = Vec::new();
    let mut parties = Vec::new();
    for (i, day) in observed.iter().enumerate() {
        ids.push(format!("C{i:03}"));
        starts.push(format!("{day} 12:00:00"));
        ends.push(format!("{day} 12:05:00"));
        parties.push(30 + (i as i64 % 7) * 3);
    }
    let n = observed.len();
    let checkouts = df!(
        "アカウント名" => vec!["ub396203"; n],
        "会計ID" => ids.clone(),
        "開始日時" => starts,
        "会計日時" => ends,
        "削除日時" => vec![None::<&str>; n],
        "金額" => vec![1000i64; n],
        "客数" => parties,
    )
    .unwrap();
    let items = df!(
        "会計ID" => ids.clone(),
        "SKU" => vec!["s1"; n],
        "バーコード" => vec!["111"; n],
        "名前" => vec!["カレー"; n],
        "数量" => vec![1i64; n],
        "金額" => vec![1000i64; n],
        "部門" => vec!["定食"; n],
    )
    .unwrap();
    let payments = df!(
        "会計ID" => ids,
        "支払い方法" => vec!["現金"; n],
    )
    .unwrap();

    let dates: Vec<String> = days.iter().map(|d| d.to_string()).collect();
    let classes: Vec<&str> = days.iter().map(|d| class_label(*d)).collect();
    let info: Vec<Option<&str>> = (0..days.len())
        .map(|i| {
            if i % 9 == 3 {
                Some("祝日 (Holiday)")
            } else if i % 7 == 5 {
                Some("月曜振替 (Replaced)")
            } else {
                None
            }
        })
        .collect();
    let calendar = df!(
        "date" => dates,
        "academic_year" => vec![2024i64; days.len()],
        "term" => vec!["SPR"; days.len()],
        "class" => classes,
        "info" => info,
    )
    .unwrap();

    let mut workspace = Workspace::new();
    workspace.load_pos(&[checkouts], &[items], &[payments]).unwrap();
    workspace.load_calendar(&calendar, 4).unwrap();
    let matrix = attendance_matrix();
    workspace.load_syllabus(&matrix, &matrix).unwrap();
    assert!(workspace.missing_prerequisites().is_empty());

    let forecast = workspace.forecast(WEST, BusinessHours::Lunch, 0.2).unwrap();

    // 25 trainable rows, ceil(25 * 0.2) = 5 held out chronologically
    assert_eq!(forecast.report.n_train, 20);
    assert_eq!(forecast.report.n_valid, 5);
    assert!(forecast.report.train_rmse.is_finite());
    assert!(forecast.report.valid_mape.is_finite());

    // the five calendar days beyond the last observation become the forecast
    let future = forecast.future.as_ref().unwrap();
    assert_eq!(future.height(), 5);
    let predicted: Vec<Option<f64>> = future
        .column("predicted")
        .unwrap()
        .f64()
        .unwrap()
        .into_iter()
        .collect();
    assert!(predicted.iter().all(|p| p.is_some_and(|v| v > 0.0)));

    // download artifact spans both subsets with null actuals on future rows
    let table = forecast.table().unwrap();
    assert_eq!(table.height(), 30);
    let actual: Vec<Option<f64>> = table
        .column("actual")
        .unwrap()
        .f64()
        .unwrap()
        .into_iter()
        .collect();
    assert!(actual[..25].iter().all(Option::is_some));
    assert!(actual[25..].iter().all(Option::is_none));
}

#[test]
fn shift_jis_files_survive_a_round_trip() {
    let mut df = df!(
        "location" => [WEST, "東カフェテリア"],
        "名前" => ["カレーライス", "味噌ラーメン"],
        "quantity" => [2i64, 1],
    )
    .unwrap();
    let bytes = io::write_sjis_csv(&mut df).unwrap();
    // the payload really is Shift-JIS, not UTF-8
    assert!(std::str::from_utf8(&bytes).is_err());

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&bytes).unwrap();
    let read_back = fs::read(file.path()).unwrap();
    let parsed = io::read_sjis_csv(&read_back).unwrap();
    assert_eq!(parsed.shape(), (2, 3));
    let names: Vec<Option<&str>> = parsed
        .column("名前")
        .unwrap()
        .utf8()
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(names, vec![Some("カレーライス"), Some("味噌ラーメン")]);
}

#[test]
fn forecast_without_uploads_names_what_is_missing() {
    let workspace = Workspace::new();
    let err = workspace
        .forecast(WEST, BusinessHours::Lunch, 0.2)
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("POS data"));
    assert!(message.contains("calendar data"));
    assert!(message.contains("attendance data"));
}

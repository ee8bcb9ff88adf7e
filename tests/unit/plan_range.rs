use chrono::{TimeZone, Utc};
use kline_backfill::plan::{last_completed_month, plan_months, work_units, YearMonth};

fn ym(year: i32, month: u32) -> YearMonth {
    YearMonth::new(year, month).unwrap()
}

#[test]
fn test_range_crosses_year_boundary() {
    let months = plan_months(ym(2023, 11), ym(2024, 2));
    let labels: Vec<String> = months.iter().map(ToString::to_string).collect();
    assert_eq!(labels, ["2023-11", "2023-12", "2024-01", "2024-02"]);
}

#[test]
fn test_current_month_is_never_planned() {
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 1).unwrap();
    assert_eq!(last_completed_month(now), ym(2023, 12));

    let mid_month = Utc.with_ymd_and_hms(2024, 7, 15, 12, 0, 0).unwrap();
    assert_eq!(last_completed_month(mid_month), ym(2024, 6));
}

#[test]
fn test_start_after_end_is_empty() {
    assert!(plan_months(ym(2024, 3), ym(2024, 2)).is_empty());
}

#[test]
fn test_units_are_symbol_major() {
    let syms = vec!["ETHUSDT".to_string(), "BTCUSDT".to_string()];
    let units = work_units(&syms, &plan_months(ym(2024, 1), ym(2024, 2)));

    let order: Vec<String> = units.iter().map(ToString::to_string).collect();
    assert_eq!(
        order,
        [
            "ETHUSDT 2024-01",
            "ETHUSDT 2024-02",
            "BTCUSDT 2024-01",
            "BTCUSDT 2024-02"
        ]
    );
}

#[test]
fn test_partition_key_matches_month() {
    let units = work_units(&["BTCUSDT".to_string()], &[ym(2021, 9)]);
    let key = units[0].partition_key();
    assert_eq!(key.symbol, "BTCUSDT");
    assert_eq!(key.yyyymm, 202109);
}

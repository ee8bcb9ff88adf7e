//! Command-line surface, exercised through the built binary

use assert_cmd::Command;

fn kline_backfill() -> Command {
    let mut cmd = Command::cargo_bin("kline-backfill").unwrap();
    for var in [
        "SYMBOLS",
        "START_YEAR",
        "START_MONTH",
        "DL_WORKERS",
        "BATCH_LINES",
        "HTTP_TIMEOUT",
        "CLICKHOUSE_PASSWORD",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_plan_human_output() {
    let output = kline_backfill()
        .args(["plan", "--symbols", "btcusdt, ethusdt", "--start-year", "2020", "--start-month", "1"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).unwrap();

    assert!(text.contains("Symbols: BTCUSDT, ETHUSDT"));
    assert!(text.contains("(2020-01.."));
    assert!(text.contains("Work units:"));
}

#[test]
fn test_plan_json_output() {
    let output = kline_backfill()
        .env("SYMBOLS", "BTCUSDT,ETHUSDT,SOLUSDT")
        .args(["--output-format", "json", "plan", "--start-year", "2021", "--start-month", "6"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let months = report["months"].as_u64().unwrap();
    assert!(months > 0);
    assert_eq!(report["units"].as_u64().unwrap(), months * 3);
    assert_eq!(report["symbols"][2], "SOLUSDT");
}

#[test]
fn test_plan_future_start_is_empty() {
    let output = kline_backfill()
        .args(["--output-format", "json", "plan", "--start-year", "2999", "--start-month", "1"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(report["months"], 0);
    assert_eq!(report["units"], 0);
}

#[test]
fn test_invalid_start_month_from_env_rejected() {
    kline_backfill()
        .env("START_MONTH", "13")
        .arg("plan")
        .assert()
        .failure();
}

#[test]
fn test_worker_count_out_of_range_rejected() {
    kline_backfill()
        .args(["backfill", "--workers", "100"])
        .assert()
        .failure();
    kline_backfill()
        .args(["backfill", "--workers", "0"])
        .assert()
        .failure();
}

#[test]
fn test_empty_symbol_list_rejected() {
    kline_backfill()
        .args(["plan", "--symbols", " , "])
        .assert()
        .failure();
}

#[test]
fn test_help_lists_commands() {
    let output = kline_backfill()
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).unwrap();

    for command in ["backfill", "plan", "weekly"] {
        assert!(text.contains(command), "help should mention {command}");
    }
}

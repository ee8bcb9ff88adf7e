//! End-to-end runs against an in-memory archive source and store

use std::sync::Arc;

use kline_backfill::config::parse_symbols;
use kline_backfill::pipeline::{BackfillError, UnitState};
use tempfile::TempDir;

use crate::common::{
    archive_url, executor, month_rows, symbols, ym, MapTransport, MemoryStore,
};

fn serve_months(transport: &MapTransport, symbol: &str, months: &[(i32, u32)], rows: usize) {
    for &(year, month) in months {
        let month = ym(year, month);
        transport.serve_rows(symbol, month, &month_rows(month, rows, false));
    }
}

#[tokio::test]
async fn test_backfill_skips_unpublished_months() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(MapTransport::new());
    let store = Arc::new(MemoryStore::new());
    for symbol in ["BTCUSDT", "ETHUSDT"] {
        serve_months(&transport, symbol, &[(2024, 1), (2024, 3)], 10);
    }

    let months = [ym(2024, 1), ym(2024, 2), ym(2024, 3)];
    let summary = executor(transport.clone(), store.clone(), dir.path(), 4, 4)
        .run(&symbols(&["BTCUSDT", "ETHUSDT"]), &months)
        .await
        .unwrap();

    assert_eq!(summary.planned, 6);
    assert_eq!(summary.downloaded, 4);
    assert_eq!(summary.absent, 2);
    assert!(summary.download_failures.is_empty());
    assert_eq!(summary.partitions_loaded, 4);
    assert_eq!(summary.total_inserted, 40);
    assert!(!summary.cancelled);

    for symbol in ["BTCUSDT", "ETHUSDT"] {
        assert_eq!(store.rows(symbol, 202401), 10);
        assert_eq!(store.rows(symbol, 202402), 0);
        assert_eq!(store.rows(symbol, 202403), 10);
    }

    // Loads follow plan order: symbol-major, months ascending
    assert_eq!(
        store.drop_queries(),
        vec![
            "ALTER TABLE spot_klines_1m DROP PARTITION ('BTCUSDT', 202401)",
            "ALTER TABLE spot_klines_1m DROP PARTITION ('BTCUSDT', 202403)",
            "ALTER TABLE spot_klines_1m DROP PARTITION ('ETHUSDT', 202401)",
            "ALTER TABLE spot_klines_1m DROP PARTITION ('ETHUSDT', 202403)",
        ]
    );

    let states: Vec<UnitState> = summary.units.iter().map(|u| u.state).collect();
    assert_eq!(
        states,
        vec![
            UnitState::Done,
            UnitState::SkippedAbsent,
            UnitState::Done,
            UnitState::Done,
            UnitState::SkippedAbsent,
            UnitState::Done,
        ]
    );
    assert!(summary.units.iter().all(|u| u.state.is_terminal()));
}

#[tokio::test]
async fn test_rerun_replaces_instead_of_appending() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(MapTransport::new());
    let store = Arc::new(MemoryStore::new());
    serve_months(&transport, "BTCUSDT", &[(2023, 12), (2024, 1)], 25);

    let months = [ym(2023, 12), ym(2024, 1)];
    let btc = symbols(&["BTCUSDT"]);
    let run = executor(transport.clone(), store.clone(), dir.path(), 2, 10);

    let first = run.run(&btc, &months).await.unwrap();
    let calls_after_first = transport.calls();
    let rows_after_first = store.partition_rows("BTCUSDT", 202401);

    let second = run.run(&btc, &months).await.unwrap();

    assert_eq!(first.total_inserted, 50);
    assert_eq!(second.total_inserted, 50);
    assert_eq!(store.total_rows(), 50);
    assert_eq!(store.partition_rows("BTCUSDT", 202401), rows_after_first);
    // Cached archives are reused
    assert_eq!(transport.calls(), calls_after_first);
}

#[tokio::test]
async fn test_download_error_is_reported_not_fatal() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(MapTransport::new());
    let store = Arc::new(MemoryStore::new());
    serve_months(&transport, "BTCUSDT", &[(2024, 1)], 3);
    transport.respond(&archive_url("BTCUSDT", ym(2024, 2)), 503);

    let summary = executor(transport, store.clone(), dir.path(), 2, 10)
        .run(&symbols(&["BTCUSDT"]), &[ym(2024, 1), ym(2024, 2)])
        .await
        .unwrap();

    assert_eq!(summary.downloaded, 1);
    assert_eq!(summary.absent, 0);
    assert_eq!(summary.download_failures.len(), 1);
    assert_eq!(summary.download_failures[0].unit.month, ym(2024, 2));
    assert!(summary.download_failures[0].error.contains("503"));
    assert_eq!(summary.units[1].state, UnitState::DownloadFailed);
    assert_eq!(summary.partitions_loaded, 1);
    assert_eq!(store.rows("BTCUSDT", 202401), 3);
}

#[tokio::test]
async fn test_corrupt_archive_marks_unit_and_run_continues() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(MapTransport::new());
    let store = Arc::new(MemoryStore::new());
    transport.serve(&archive_url("BTCUSDT", ym(2024, 1)), b"not a zip archive".to_vec());
    serve_months(&transport, "BTCUSDT", &[(2024, 2)], 7);

    let summary = executor(transport, store.clone(), dir.path(), 2, 10)
        .run(&symbols(&["BTCUSDT"]), &[ym(2024, 1), ym(2024, 2)])
        .await
        .unwrap();

    assert_eq!(summary.units[0].state, UnitState::LoadFailed);
    assert_eq!(summary.units[1].state, UnitState::Done);
    assert_eq!(summary.load_failures.len(), 1);
    assert_eq!(summary.partitions_loaded, 1);
    assert_eq!(summary.total_inserted, 7);
    assert_eq!(store.rows("BTCUSDT", 202402), 7);
}

#[tokio::test]
async fn test_malformed_row_fails_only_its_unit() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(MapTransport::new());
    let store = Arc::new(MemoryStore::new());

    let mut rows = month_rows(ym(2024, 1), 4, false);
    rows.push("1704067440000,abc,1,1,1,1,1704067499999,1,1,1,1,0".to_string());
    transport.serve_rows("BTCUSDT", ym(2024, 1), &rows);
    serve_months(&transport, "ETHUSDT", &[(2024, 1)], 2);

    let summary = executor(transport, store.clone(), dir.path(), 2, 100)
        .run(&symbols(&["BTCUSDT", "ETHUSDT"]), &[ym(2024, 1)])
        .await
        .unwrap();

    assert_eq!(summary.units[0].state, UnitState::LoadFailed);
    assert!(summary.load_failures[0].error.contains("row 5: invalid open"));
    assert_eq!(summary.units[1].state, UnitState::Done);
    assert_eq!(store.rows("ETHUSDT", 202401), 2);
}

#[tokio::test]
async fn test_empty_archive_loads_zero_rows() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(MapTransport::new());
    let store = Arc::new(MemoryStore::new());
    transport.serve(
        &archive_url("BTCUSDT", ym(2024, 1)),
        crate::common::empty_zip_bytes(),
    );

    let summary = executor(transport, store.clone(), dir.path(), 1, 10)
        .run(&symbols(&["BTCUSDT"]), &[ym(2024, 1)])
        .await
        .unwrap();

    assert_eq!(summary.units[0].state, UnitState::Done);
    assert_eq!(summary.units[0].rows, 0);
    assert_eq!(summary.partitions_loaded, 1);
    assert!(store.insert_sizes().is_empty());
}

#[tokio::test]
async fn test_insert_failure_halts_run() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(MapTransport::new());
    let store = Arc::new(MemoryStore::new());
    serve_months(&transport, "BTCUSDT", &[(2024, 1), (2024, 2), (2024, 3)], 5);
    // First unit's single batch succeeds, the second unit's insert fails
    store.fail_inserts_after(1);

    let err = executor(transport, store.clone(), dir.path(), 2, 10)
        .run(
            &symbols(&["BTCUSDT"]),
            &[ym(2024, 1), ym(2024, 2), ym(2024, 3)],
        )
        .await
        .unwrap_err();

    match err {
        BackfillError::Store {
            unit,
            inserted,
            source,
        } => {
            assert_eq!(unit.month, ym(2024, 2));
            assert_eq!(inserted, 5);
            assert!(source.to_string().contains("Memory limit"));
        }
        other => panic!("expected store error, got {other:?}"),
    }

    // The third unit was never touched
    assert!(!store
        .drop_queries()
        .iter()
        .any(|q| q.contains("202403")));
}

#[tokio::test]
async fn test_drop_privilege_error_halts_run() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(MapTransport::new());
    let store = Arc::new(MemoryStore::new());
    serve_months(&transport, "BTCUSDT", &[(2024, 1)], 5);
    store.fail_drops_with("Code: 497. DB::Exception: default: Not enough privileges.");

    let err = executor(transport, store.clone(), dir.path(), 1, 10)
        .run(&symbols(&["BTCUSDT"]), &[ym(2024, 1)])
        .await
        .unwrap_err();

    assert!(matches!(err, BackfillError::Store { inserted: 0, .. }));
    assert!(err.to_string().contains("Not enough privileges"));
    assert!(store.insert_sizes().is_empty());
}

#[tokio::test]
async fn test_microsecond_archive_keeps_unit() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(MapTransport::new());
    let store = Arc::new(MemoryStore::new());
    let month = ym(2025, 1);
    transport.serve_rows("BTCUSDT", month, &month_rows(month, 3, true));

    let summary = executor(transport, store.clone(), dir.path(), 1, 10)
        .run(&symbols(&["BTCUSDT"]), &[month])
        .await
        .unwrap();

    assert_eq!(summary.total_inserted, 3);
    let rows = store.partition_rows("BTCUSDT", 202501);
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.split('\t').nth(2) == Some("us")));
    assert!(rows[0].starts_with("BTCUSDT\t1735689600000000\tus\t"));
}

#[tokio::test]
async fn test_empty_plan_is_a_noop() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(MapTransport::new());
    let store = Arc::new(MemoryStore::new());

    let summary = executor(transport.clone(), store.clone(), dir.path(), 4, 10)
        .run(&symbols(&["BTCUSDT"]), &[])
        .await
        .unwrap();

    assert_eq!(summary.planned, 0);
    assert_eq!(summary.total_inserted, 0);
    assert_eq!(transport.calls(), 0);
    assert!(store.queries().is_empty());
}

#[tokio::test]
async fn test_repeated_symbol_replaces_partition_once() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(MapTransport::new());
    let store = Arc::new(MemoryStore::new());
    serve_months(&transport, "BTCUSDT", &[(2024, 1)], 5);

    let configured = parse_symbols("BTCUSDT,btcusdt");
    assert_eq!(configured, vec!["BTCUSDT"]);

    let summary = executor(transport.clone(), store.clone(), dir.path(), 4, 10)
        .run(&configured, &[ym(2024, 1)])
        .await
        .unwrap();

    assert_eq!(summary.planned, 1);
    assert_eq!(summary.downloaded, 1);
    assert!(summary.download_failures.is_empty());
    assert_eq!(summary.partitions_loaded, 1);
    assert_eq!(summary.total_inserted, 5);
    assert_eq!(transport.calls(), 1);
    assert_eq!(store.drop_queries().len(), 1);
    assert_eq!(store.rows("BTCUSDT", 202401), 5);
}

#[tokio::test]
async fn test_repeated_symbol_passed_directly_is_planned_once() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(MapTransport::new());
    let store = Arc::new(MemoryStore::new());
    serve_months(&transport, "BTCUSDT", &[(2024, 1)], 5);

    let summary = executor(transport, store.clone(), dir.path(), 4, 10)
        .run(&symbols(&["BTCUSDT", "BTCUSDT"]), &[ym(2024, 1)])
        .await
        .unwrap();

    assert_eq!(summary.planned, 1);
    assert_eq!(summary.total_inserted, store.total_rows() as u64);
    assert_eq!(store.drop_queries().len(), 1);
}

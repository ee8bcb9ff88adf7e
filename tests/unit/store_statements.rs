use async_trait::async_trait;
use kline_backfill::plan::PartitionKey;
use kline_backfill::store::{
    drop_partition_sql, insert_sql, replace_partition, weekly_bars, KlineStore, ReplaceOutcome,
    StoreError, StoreResult, INSERT_COLUMNS,
};

/// Answers every statement with one canned result
struct CannedStore(Result<&'static str, (u16, &'static str)>);

#[async_trait]
impl KlineStore for CannedStore {
    async fn execute(&self, _query: &str, _body: Option<String>) -> StoreResult<String> {
        match self.0 {
            Ok(body) => Ok(body.to_string()),
            Err((status, body)) => Err(StoreError::http(status, body)),
        }
    }

    fn table(&self) -> &str {
        "spot_klines_1m"
    }
}

fn key() -> PartitionKey {
    PartitionKey {
        symbol: "BTCUSDT".to_string(),
        yyyymm: 202401,
    }
}

#[test]
fn test_statements_name_table_and_partition() {
    assert_eq!(
        drop_partition_sql("db_table", &key()),
        "ALTER TABLE db_table DROP PARTITION ('BTCUSDT', 202401)"
    );

    let insert = insert_sql("db_table");
    assert!(insert.starts_with("INSERT INTO db_table (symbol, open_ts, ts_unit, "));
    assert!(insert.ends_with(") FORMAT TabSeparated"));
    assert_eq!(INSERT_COLUMNS.len(), 13);
}

#[tokio::test]
async fn test_missing_partition_variants_are_tolerated() {
    for body in [
        "Code: 248. DB::Exception: Partition doesn't exist",
        "Code: 60. DB::Exception: Table default.x does not exist",
        "No such partition",
    ] {
        let store = CannedStore(Err((500, body)));
        let outcome = replace_partition(&store, &key()).await.unwrap();
        assert_eq!(outcome, ReplaceOutcome::NothingToDrop, "body: {body}");
    }
}

#[tokio::test]
async fn test_other_drop_errors_propagate() {
    let store = CannedStore(Err((401, "Authentication failed: password is incorrect")));
    let err = replace_partition(&store, &key()).await.unwrap_err();
    assert!(matches!(err, StoreError::Http { status: 401, .. }));
}

#[test]
fn test_error_body_is_truncated() {
    let long = "é".repeat(2000);
    let err = StoreError::http(500, &long);
    match err {
        StoreError::Http { body, .. } => assert_eq!(body.chars().count(), 700),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_weekly_bars_oldest_first() {
    let store = CannedStore(Ok(concat!(
        r#"{"symbol":"BTCUSDT","week_start":"2024-01-08","open":1.0,"high":2.0,"low":0.5,"close":1.5,"volume":10.0,"trades":"42"}"#,
        "\n",
        r#"{"symbol":"BTCUSDT","week_start":"2024-01-01","open":1.0,"high":2.0,"low":0.5,"close":1.5,"volume":10.0,"trades":7}"#,
        "\n"
    )));

    let bars = weekly_bars(&store, "BTCUSDT", 200).await.unwrap();

    assert_eq!(bars.len(), 2);
    assert_eq!(bars[0].week_start.to_string(), "2024-01-01");
    assert_eq!(bars[1].trades, 42);
}

#[tokio::test]
async fn test_weekly_bars_empty_result() {
    let store = CannedStore(Ok(""));
    assert!(weekly_bars(&store, "NOPEUSDT", 20).await.unwrap().is_empty());
}

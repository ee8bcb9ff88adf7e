//! Live checks against data.binance.vision
//!
//! Run with `--ignored`; these need network access.

use std::sync::Arc;
use std::time::Duration;

use kline_backfill::config::DEFAULT_ARCHIVE_BASE_URL;
use kline_backfill::fetcher::{ArchiveFetcher, ArchiveLocator, ReqwestTransport};
use kline_backfill::plan::{WorkUnit, YearMonth};
use kline_backfill::transcode::read_all;
use kline_backfill::TimestampUnit;
use tempfile::TempDir;

fn live_fetcher(dir: &TempDir) -> ArchiveFetcher {
    let transport = ReqwestTransport::new(Duration::from_secs(60)).unwrap();
    ArchiveFetcher::new(
        Arc::new(transport),
        ArchiveLocator::new(DEFAULT_ARCHIVE_BASE_URL, dir.path()),
    )
    .with_checksum_verification(true)
}

#[tokio::test]
#[ignore]
async fn test_live_month_decodes_full() {
    let dir = TempDir::new().unwrap();
    let unit = WorkUnit::new("BTCUSDT", YearMonth::new(2021, 2).unwrap());

    let handle = live_fetcher(&dir).fetch(&unit).await.unwrap();
    let records = read_all(handle.path(), "BTCUSDT").unwrap();

    // 28 days of minutes
    assert_eq!(records.len(), 28 * 1440);
    assert_eq!(records[0].ts_unit, TimestampUnit::Millis);
    assert_eq!(records[0].open_ts, 1_612_137_600_000);
}

#[tokio::test]
#[ignore]
async fn test_live_unlisted_month_is_not_found() {
    let dir = TempDir::new().unwrap();
    let unit = WorkUnit::new("SOLUSDT", YearMonth::new(2017, 1).unwrap());

    let err = live_fetcher(&dir).fetch(&unit).await.unwrap_err();
    assert!(err.is_not_found());
}

//! Weekly OHLCV aggregation over the loaded table
//!
//! This is the read side used by reporting: one row per `(symbol, week)`,
//! weeks starting on Monday.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use super::{KlineStore, StoreError, StoreResult};

/// Smallest accepted week window
pub const MIN_WEEKS: u32 = 20;
/// Largest accepted week window
pub const MAX_WEEKS: u32 = 400;
/// Default week window
pub const DEFAULT_WEEKS: u32 = 200;

/// One aggregated week
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyBar {
    /// Trading symbol
    pub symbol: String,
    /// Monday of the week
    pub week_start: NaiveDate,
    /// First open of the week
    pub open: f64,
    /// Highest high
    pub high: f64,
    /// Lowest low
    pub low: f64,
    /// Last close of the week
    pub close: f64,
    /// Summed base volume
    pub volume: f64,
    /// Summed trade count
    #[serde(deserialize_with = "lenient_u64")]
    pub trades: u64,
}

/// ClickHouse may quote 64-bit integers in JSON output.
fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrText {
        Num(u64),
        Text(String),
    }

    match NumOrText::deserialize(deserializer)? {
        NumOrText::Num(n) => Ok(n),
        NumOrText::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// Weekly aggregation statement, newest week first
pub fn weekly_sql(table: &str, symbol: &str, weeks: u32) -> String {
    format!(
        "SELECT \
           symbol, \
           toStartOfWeek(open_time, 1) AS week_start, \
           argMin(open, open_time) AS open, \
           max(high) AS high, \
           min(low) AS low, \
           argMax(close, open_time) AS close, \
           sum(volume) AS volume, \
           sum(trade_count) AS trades \
         FROM {table} \
         WHERE symbol = '{}' \
         GROUP BY symbol, week_start \
         ORDER BY week_start DESC \
         LIMIT {weeks} \
         FORMAT JSONEachRow",
        symbol.replace('\\', "\\\\").replace('\'', "\\'")
    )
}

/// Decode a `JSONEachRow` response body
pub fn parse_weekly_rows(body: &str) -> StoreResult<Vec<WeeklyBar>> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str::<WeeklyBar>(line)
                .map_err(|e| StoreError::InvalidResponse(format!("{e}: {line}")))
        })
        .collect()
}

/// Fetch the most recent `weeks` weekly bars for `symbol`, oldest first.
///
/// An empty result is returned as an empty vector.
pub async fn weekly_bars(
    store: &dyn KlineStore,
    symbol: &str,
    weeks: u32,
) -> StoreResult<Vec<WeeklyBar>> {
    let weeks = weeks.clamp(MIN_WEEKS, MAX_WEEKS);
    let sql = weekly_sql(store.table(), symbol, weeks);
    let body = store.execute(&sql, None).await?;

    let mut bars = parse_weekly_rows(&body)?;
    bars.sort_by_key(|bar| bar.week_start);

    if bars.is_empty() {
        warn!(symbol = %symbol, table = %store.table(), "No weekly data returned");
    } else {
        debug!(symbol = %symbol, weeks = bars.len(), "Weekly bars fetched");
    }
    Ok(bars)
}

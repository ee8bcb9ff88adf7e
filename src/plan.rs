//! Month range planning
//!
//! The backfill covers every calendar month from a configured start up to the
//! last month that has fully elapsed. The current month is never included,
//! since its archive is not published until the month closes.
//!
//! - [`YearMonth`] - calendar month with ordering and successor
//! - [`WorkUnit`] - one `(symbol, month)` to ingest
//! - [`PartitionKey`] - `(symbol, yyyymm)` slice of the destination table
//! - [`plan`] / [`plan_months`] - inclusive month sequences

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Year and month, ordered chronologically
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    /// Year (e.g., 2024)
    pub year: i32,
    /// Month (1-12)
    pub month: u32,
}

impl YearMonth {
    /// Create a month, returning `None` when `month` is outside 1..=12.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// Month containing the given instant
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self {
            year: dt.year(),
            month: dt.month(),
        }
    }

    /// The following calendar month, wrapping December into January.
    pub fn succ(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// The preceding calendar month, wrapping January into December.
    pub fn pred(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// `year * 100 + month`, the integer half of a partition key
    pub fn yyyymm(&self) -> u32 {
        self.year as u32 * 100 + self.month
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = String;

    /// Parse `YYYY-MM`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| format!("Invalid month (expected YYYY-MM): {s}"))?;
        let year = year
            .parse::<i32>()
            .map_err(|e| format!("Invalid year in {s}: {e}"))?;
        let month = month
            .parse::<u32>()
            .map_err(|e| format!("Invalid month in {s}: {e}"))?;
        Self::new(year, month).ok_or_else(|| format!("Month out of range in {s}"))
    }
}

/// Last fully completed calendar month relative to `now`
pub fn last_completed_month(now: DateTime<Utc>) -> YearMonth {
    YearMonth::from_datetime(now).pred()
}

/// Inclusive, strictly increasing month sequence from `start` to `end`.
///
/// Returns an empty sequence when `start` is after `end`.
pub fn plan_months(start: YearMonth, end: YearMonth) -> Vec<YearMonth> {
    let mut months = Vec::new();
    let mut current = start;
    while current <= end {
        months.push(current);
        current = current.succ();
    }
    months
}

/// Months from `start` through the last fully completed month.
pub fn plan(start: YearMonth) -> Vec<YearMonth> {
    plan_months(start, last_completed_month(Utc::now()))
}

/// One `(symbol, month)` archive to ingest
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkUnit {
    /// Trading symbol (e.g., "BTCUSDT")
    pub symbol: String,
    /// Archive month
    pub month: YearMonth,
}

impl WorkUnit {
    /// Create a work unit
    pub fn new(symbol: impl Into<String>, month: YearMonth) -> Self {
        Self {
            symbol: symbol.into(),
            month,
        }
    }

    /// Partition this unit replaces
    pub fn partition_key(&self) -> PartitionKey {
        PartitionKey {
            symbol: self.symbol.clone(),
            yyyymm: self.month.yyyymm(),
        }
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.symbol, self.month)
    }
}

/// Cross product of symbols and months.
///
/// Symbols keep their configured order, months their calendar order within
/// each symbol. This is the order the load phase walks. A repeated symbol
/// contributes its units once, so every partition key appears at most once.
pub fn work_units(symbols: &[String], months: &[YearMonth]) -> Vec<WorkUnit> {
    let mut seen = HashSet::new();
    symbols
        .iter()
        .filter(|symbol| seen.insert(symbol.as_str()))
        .flat_map(|symbol| months.iter().map(move |m| WorkUnit::new(symbol.clone(), *m)))
        .collect()
}

/// `(symbol, yyyymm)` key of a replaceable table slice
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    /// Trading symbol
    pub symbol: String,
    /// `year * 100 + month`
    pub yyyymm: u32,
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(symbol={}, yyyymm={})", self.symbol, self.yyyymm)
    }
}

//! Partition replacement and insert statements
//!
//! The destination table is partitioned by `(symbol, toYYYYMM(open_time))`.
//! Loading a unit first drops its partition, so a rerun replaces data instead
//! of appending to it.

use tracing::{debug, info};

use super::{KlineStore, StoreResult, INSERT_COLUMNS};
use crate::metrics;
use crate::plan::PartitionKey;

/// What a drop did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// An existing partition was dropped (or the store reported no error)
    Dropped,
    /// The store reported there was nothing to drop
    NothingToDrop,
}

/// Escape a value for a single-quoted SQL string literal
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// `ALTER TABLE ... DROP PARTITION` for one key
pub fn drop_partition_sql(table: &str, key: &PartitionKey) -> String {
    format!(
        "ALTER TABLE {} DROP PARTITION ({}, {})",
        table,
        quote(&key.symbol),
        key.yyyymm
    )
}

/// `INSERT ... FORMAT TabSeparated` with the fixed column list
pub fn insert_sql(table: &str) -> String {
    format!(
        "INSERT INTO {} ({}) FORMAT TabSeparated",
        table,
        INSERT_COLUMNS.join(", ")
    )
}

/// Drop any existing data for `key`.
///
/// A "does not exist" class response is a no-op success; every other store
/// error is returned.
pub async fn replace_partition(
    store: &dyn KlineStore,
    key: &PartitionKey,
) -> StoreResult<ReplaceOutcome> {
    let sql = drop_partition_sql(store.table(), key);
    match store.execute(&sql, None).await {
        Ok(_) => {
            info!(symbol = %key.symbol, yyyymm = key.yyyymm, "Dropped partition");
            metrics::record_partition_drop("dropped");
            Ok(ReplaceOutcome::Dropped)
        }
        Err(e) if e.is_missing_partition() => {
            debug!(symbol = %key.symbol, yyyymm = key.yyyymm, "No partition to drop");
            metrics::record_partition_drop("missing");
            Ok(ReplaceOutcome::NothingToDrop)
        }
        Err(e) => {
            metrics::record_partition_drop("error");
            Err(e)
        }
    }
}

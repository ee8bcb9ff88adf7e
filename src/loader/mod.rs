//! Batched loading
//!
//! Records are serialized into tab-separated [`Batch`]es and inserted one
//! batch per store call.
//!
//! # Architecture
//!
//! ```text
//! spawn_blocking                         async task
//! ┌──────────────────────────┐  mpsc(1)  ┌────────────────────────┐
//! │ ArchiveReader            │──────────>│ insert batch           │
//! │  -> KlineRecords         │  Batch    │ (one call in flight)   │
//! │  -> Batches(batch_lines) │           └────────────────────────┘
//! └──────────────────────────┘
//! ```
//!
//! Zip inflation and CSV parsing are blocking work, so they run off the
//! runtime. The channel holds one batch, which keeps at most two batches
//! resident while the previous insert is in flight.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::fetcher::ArchiveHandle;
use crate::metrics;
use crate::store::{insert_sql, KlineStore, StoreError};
use crate::transcode::{ArchiveReader, TranscodeError, TranscodeResult};
use crate::KlineRecord;

/// Loader errors
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Store rejected an insert; fatal to the run
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Archive could not be decoded; fatal to the unit only
    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    /// Transcoding worker panicked or was cancelled
    #[error("transcode task failed: {0}")]
    Task(String),
}

impl LoadError {
    /// Whether this error must halt the whole load phase
    pub fn is_fatal(&self) -> bool {
        matches!(self, LoadError::Store(_))
    }
}

/// Serialized rows awaiting one insert call
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Batch {
    body: String,
    rows: usize,
}

impl Batch {
    /// Empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty batch with room for roughly `rows` rows
    pub fn with_capacity(rows: usize) -> Self {
        Self {
            body: String::with_capacity(rows.saturating_mul(160).min(64 << 20)),
            rows: 0,
        }
    }

    /// Append one record
    pub fn push(&mut self, record: &KlineRecord) {
        record.write_tsv(&mut self.body);
        self.rows += 1;
    }

    /// Rows in the batch
    pub fn len(&self) -> usize {
        self.rows
    }

    /// Whether the batch holds no rows
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Serialized rows
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Take the serialized rows
    pub fn into_body(self) -> String {
        self.body
    }
}

/// Groups a record stream into batches of at most `limit` rows.
///
/// The first decode error is yielded once and ends the stream; records
/// buffered since the previous batch are discarded with it.
pub struct Batches<I> {
    records: I,
    limit: usize,
    done: bool,
}

impl<I> Batches<I>
where
    I: Iterator<Item = TranscodeResult<KlineRecord>>,
{
    /// Wrap `records`; a zero `limit` is treated as 1.
    pub fn new(records: I, limit: usize) -> Self {
        Self {
            records,
            limit: limit.max(1),
            done: false,
        }
    }
}

impl<I> Iterator for Batches<I>
where
    I: Iterator<Item = TranscodeResult<KlineRecord>>,
{
    type Item = TranscodeResult<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut batch = Batch::with_capacity(self.limit.min(8192));
        while batch.len() < self.limit {
            match self.records.next() {
                Some(Ok(record)) => batch.push(&record),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        (!batch.is_empty()).then_some(Ok(batch))
    }
}

/// Inserts archives into the store in bounded batches
#[derive(Clone)]
pub struct BatchedLoader {
    store: Arc<dyn KlineStore>,
    batch_lines: usize,
    insert_sql: String,
}

impl std::fmt::Debug for BatchedLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchedLoader")
            .field("table", &self.store.table())
            .field("batch_lines", &self.batch_lines)
            .finish()
    }
}

impl BatchedLoader {
    /// Create a loader flushing every `batch_lines` rows
    pub fn new(store: Arc<dyn KlineStore>, batch_lines: usize) -> Self {
        let insert_sql = insert_sql(store.table());
        Self {
            store,
            batch_lines: batch_lines.max(1),
            insert_sql,
        }
    }

    /// Insert one batch, returning its row count
    pub async fn insert_batch(&self, batch: Batch, symbol: &str) -> Result<usize, StoreError> {
        let rows = batch.len();
        let started = Instant::now();
        self.store
            .execute(&self.insert_sql, Some(batch.into_body()))
            .await?;
        let elapsed = started.elapsed();

        metrics::record_insert_batch(symbol, rows, elapsed);
        debug!(symbol = %symbol, rows, elapsed_ms = elapsed.as_millis() as u64, "Inserted batch");
        Ok(rows)
    }

    /// Insert every record of an in-memory stream
    pub async fn load_records<I>(&self, records: I, symbol: &str) -> Result<u64, LoadError>
    where
        I: IntoIterator<Item = TranscodeResult<KlineRecord>>,
    {
        let mut total = 0u64;
        for batch in Batches::new(records.into_iter(), self.batch_lines) {
            total += self.insert_batch(batch?, symbol).await? as u64;
        }
        Ok(total)
    }

    /// Stream a cached archive into the store and return the inserted rows.
    ///
    /// Rows inserted before a decode error stay in the store; the next run
    /// drops the partition before loading it again.
    pub async fn load_archive(&self, handle: &ArchiveHandle, symbol: &str) -> Result<u64, LoadError> {
        let (tx, mut rx) = mpsc::channel::<TranscodeResult<Batch>>(1);
        let path = handle.path().to_path_buf();
        let owned_symbol = symbol.to_string();
        let batch_lines = self.batch_lines;

        let producer = tokio::task::spawn_blocking(move || {
            let mut reader = match ArchiveReader::open(&path) {
                Ok(reader) => reader,
                Err(e) => {
                    let _ = tx.blocking_send(Err(e));
                    return;
                }
            };
            let records = match reader.records(&owned_symbol) {
                Ok(Some(records)) => records,
                Ok(None) => return,
                Err(e) => {
                    let _ = tx.blocking_send(Err(e));
                    return;
                }
            };
            for batch in Batches::new(records, batch_lines) {
                // Receiver gone means the consumer stopped on an error.
                if tx.blocking_send(batch).is_err() {
                    return;
                }
            }
        });

        let mut total = 0u64;
        let mut failure: Option<LoadError> = None;
        while let Some(message) = rx.recv().await {
            let result = match message {
                Ok(batch) => self.insert_batch(batch, symbol).await.map_err(LoadError::from),
                Err(e) => Err(LoadError::from(e)),
            };
            match result {
                Ok(rows) => total += rows as u64,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        drop(rx);

        let joined = producer.await;
        if let Some(e) = failure {
            if total > 0 {
                warn!(symbol = %symbol, rows = total, "Archive load stopped after partial insert");
            }
            return Err(e);
        }
        joined.map_err(|e| LoadError::Task(e.to_string()))?;

        Ok(total)
    }
}

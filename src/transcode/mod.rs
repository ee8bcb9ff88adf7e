//! Archive transcoding
//!
//! Turns a cached monthly archive into a lazy sequence of [`KlineRecord`]s.
//!
//! # Archive layout
//!
//! Each archive holds one headerless CSV file with exactly 12 columns:
//!
//! | # | Column |
//! |---|---|
//! | 0 | open_time |
//! | 1-4 | open, high, low, close |
//! | 5 | volume |
//! | 6 | close_time |
//! | 7 | quote_asset_volume |
//! | 8 | number_of_trades |
//! | 9 | taker_buy_base_volume |
//! | 10 | taker_buy_quote_volume |
//! | 11 | ignore |
//!
//! Only the first archive entry is read. The timestamp unit is detected from
//! the first data row and applied to every record of the archive.
//!
//! Parsing is fail-fast: the first malformed row ends the sequence with an
//! error and no later rows are produced.

use csv::StringRecord;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::{KlineRecord, TimestampUnit};

/// Columns per CSV row
pub const FIELD_COUNT: usize = 12;

/// Transcoding errors
#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    /// Archive file could not be opened or read
    #[error("IO error: {0}")]
    Io(String),

    /// Archive is not a readable zip
    #[error("zip error: {0}")]
    Zip(String),

    /// CSV decoding failed
    #[error("CSV error at row {line}: {message}")]
    Csv {
        /// 1-based row number
        line: u64,
        /// Decoder message
        message: String,
    },

    /// Row has the wrong number of columns
    #[error("row {line} has {found} fields, expected {FIELD_COUNT}")]
    FieldCount {
        /// 1-based row number
        line: u64,
        /// Columns found
        found: usize,
    },

    /// A column could not be parsed
    #[error("row {line}: invalid {field} value {value:?}")]
    InvalidField {
        /// 1-based row number
        line: u64,
        /// Column name
        field: &'static str,
        /// Raw text
        value: String,
    },
}

/// Result type for transcoding
pub type TranscodeResult<T> = Result<T, TranscodeError>;

/// An opened archive
pub struct ArchiveReader {
    archive: ZipArchive<BufReader<File>>,
    path: PathBuf,
}

impl std::fmt::Debug for ArchiveReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveReader")
            .field("path", &self.path)
            .field("entries", &self.archive.len())
            .finish()
    }
}

impl ArchiveReader {
    /// Open a zip archive from disk
    pub fn open(path: &Path) -> TranscodeResult<Self> {
        let file = File::open(path)
            .map_err(|e| TranscodeError::Io(format!("open {}: {e}", path.display())))?;
        let archive = ZipArchive::new(BufReader::new(file))
            .map_err(|e| TranscodeError::Zip(format!("{}: {e}", path.display())))?;

        debug!(path = %path.display(), entries = archive.len(), "Opened archive");
        Ok(Self {
            archive,
            path: path.to_path_buf(),
        })
    }

    /// Number of entries in the archive
    pub fn entry_count(&self) -> usize {
        self.archive.len()
    }

    /// Lazily decode the first entry as records for `symbol`.
    ///
    /// Returns `None`, with a warning, when the archive has no entries.
    pub fn records(
        &mut self,
        symbol: &str,
    ) -> TranscodeResult<Option<KlineRecords<impl Read + '_>>> {
        if self.entry_count() == 0 {
            warn!(path = %self.path.display(), "Archive has no entries");
            return Ok(None);
        }

        let entry = self
            .archive
            .by_index(0)
            .map_err(|e| TranscodeError::Zip(format!("{}: {e}", self.path.display())))?;
        debug!(entry = %entry.name(), size = entry.size(), "Decoding archive entry");

        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(entry);

        Ok(Some(KlineRecords {
            reader,
            symbol: symbol.to_string(),
            unit: None,
            row: StringRecord::new(),
            line: 0,
            finished: false,
        }))
    }
}

/// Lazy record sequence over one archive entry
pub struct KlineRecords<R> {
    reader: csv::Reader<R>,
    symbol: String,
    unit: Option<TimestampUnit>,
    row: StringRecord,
    line: u64,
    finished: bool,
}

impl<R: Read> KlineRecords<R> {
    fn next_record(&mut self) -> TranscodeResult<Option<KlineRecord>> {
        loop {
            let more = self
                .reader
                .read_record(&mut self.row)
                .map_err(|e| TranscodeError::Csv {
                    line: self.line + 1,
                    message: e.to_string(),
                })?;
            if !more {
                return Ok(None);
            }
            self.line += 1;

            if self.line == 1 && self.row.get(0).map(str::trim) == Some("open_time") {
                debug!("Skipping header row");
                continue;
            }

            let record = parse_row(&self.row, self.line, &self.symbol, &mut self.unit)?;
            return Ok(Some(record));
        }
    }
}

impl<R: Read> Iterator for KlineRecords<R> {
    type Item = TranscodeResult<KlineRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

fn field<'r>(row: &'r StringRecord, idx: usize) -> &'r str {
    row.get(idx).unwrap_or_default().trim()
}

fn parse_i64(row: &StringRecord, idx: usize, line: u64, name: &'static str) -> TranscodeResult<i64> {
    let raw = field(row, idx);
    raw.parse::<i64>().map_err(|_| TranscodeError::InvalidField {
        line,
        field: name,
        value: raw.to_string(),
    })
}

fn parse_f64(row: &StringRecord, idx: usize, line: u64, name: &'static str) -> TranscodeResult<f64> {
    let raw = field(row, idx);
    raw.parse::<f64>().map_err(|_| TranscodeError::InvalidField {
        line,
        field: name,
        value: raw.to_string(),
    })
}

/// Integer text, or float text with no fractional part ("5432.0").
fn parse_trade_count(row: &StringRecord, idx: usize, line: u64) -> TranscodeResult<u64> {
    let raw = field(row, idx);
    if let Ok(n) = raw.parse::<u64>() {
        return Ok(n);
    }
    match raw.parse::<f64>() {
        Ok(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => {
            Ok(f as u64)
        }
        _ => Err(TranscodeError::InvalidField {
            line,
            field: "number_of_trades",
            value: raw.to_string(),
        }),
    }
}

/// Parse one CSV row; `unit` is set from the first row and reused after.
pub fn parse_row(
    row: &StringRecord,
    line: u64,
    symbol: &str,
    unit: &mut Option<TimestampUnit>,
) -> TranscodeResult<KlineRecord> {
    if row.len() != FIELD_COUNT {
        return Err(TranscodeError::FieldCount {
            line,
            found: row.len(),
        });
    }

    let open_ts = parse_i64(row, 0, line, "open_time")?;
    let ts_unit = *unit.get_or_insert_with(|| TimestampUnit::detect(open_ts));

    Ok(KlineRecord {
        symbol: symbol.to_string(),
        open_ts,
        ts_unit,
        open: parse_f64(row, 1, line, "open")?,
        high: parse_f64(row, 2, line, "high")?,
        low: parse_f64(row, 3, line, "low")?,
        close: parse_f64(row, 4, line, "close")?,
        volume: parse_f64(row, 5, line, "volume")?,
        close_ts: parse_i64(row, 6, line, "close_time")?,
        quote_volume: parse_f64(row, 7, line, "quote_asset_volume")?,
        trade_count: parse_trade_count(row, 8, line)?,
        taker_buy_base_volume: parse_f64(row, 9, line, "taker_buy_base_volume")?,
        taker_buy_quote_volume: parse_f64(row, 10, line, "taker_buy_quote_volume")?,
    })
}

/// Decode a whole archive into memory.
///
/// Meant for small archives and tests; the loader streams instead.
pub fn read_all(path: &Path, symbol: &str) -> TranscodeResult<Vec<KlineRecord>> {
    let mut reader = ArchiveReader::open(path)?;
    let records = match reader.records(symbol)? {
        Some(records) => records.collect::<TranscodeResult<Vec<_>>>()?,
        None => Vec::new(),
    };
    Ok(records)
}

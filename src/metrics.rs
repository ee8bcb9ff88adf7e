//! Backfill metrics
//!
//! Counters and histograms are always recorded through the `metrics` facade;
//! they are only exported when a Prometheus listener has been installed with
//! [`init_metrics`]. Without a recorder every call is a cheap no-op.
//!
//! ## Metrics
//!
//! | Name | Type | Labels |
//! |---|---|---|
//! | `archive_downloads_total` | counter | `outcome` = downloaded, absent, failed |
//! | `partitions_dropped_total` | counter | `result` = dropped, missing, error |
//! | `rows_inserted_total` | counter | `symbol` |
//! | `insert_batches_total` | counter | |
//! | `insert_batch_duration_seconds` | histogram | |
//! | `unit_loads_total` | counter | `symbol`, `result` = done, failed |
//! | `unit_load_duration_seconds` | histogram | `symbol` |

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Metrics setup errors
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Exporter could not be installed (port in use, recorder already set)
    #[error("failed to install Prometheus exporter on {addr}: {message}")]
    Install {
        /// Listen address
        addr: SocketAddr,
        /// Underlying error
        message: String,
    },
}

/// Install the Prometheus exporter on `addr`.
///
/// Must run inside a Tokio runtime. Idempotent: later calls are no-ops.
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        METRICS_INITIALIZED.store(false, Ordering::SeqCst);
        return Err(MetricsError::Install {
            addr,
            message: e.to_string(),
        });
    }

    describe_counter!(
        "archive_downloads_total",
        Unit::Count,
        "Archive fetch outcomes by result"
    );
    describe_counter!(
        "partitions_dropped_total",
        Unit::Count,
        "Partition drop statements by result"
    );
    describe_counter!(
        "rows_inserted_total",
        Unit::Count,
        "Rows inserted into the store"
    );
    describe_counter!(
        "insert_batches_total",
        Unit::Count,
        "Insert calls issued"
    );
    describe_histogram!(
        "insert_batch_duration_seconds",
        Unit::Seconds,
        "Duration of a single insert call"
    );
    describe_counter!(
        "unit_loads_total",
        Unit::Count,
        "Work units loaded, by result"
    );
    describe_histogram!(
        "unit_load_duration_seconds",
        Unit::Seconds,
        "Partition replace plus load duration per unit"
    );

    info!(addr = %addr, "Metrics exporter listening");
    Ok(())
}

/// Whether [`init_metrics`] has installed the exporter
pub fn is_initialized() -> bool {
    METRICS_INITIALIZED.load(Ordering::SeqCst)
}

/// Count one archive fetch outcome
pub fn record_download(outcome: &'static str) {
    counter!("archive_downloads_total", "outcome" => outcome).increment(1);
}

/// Count one partition drop
pub fn record_partition_drop(result: &'static str) {
    counter!("partitions_dropped_total", "result" => result).increment(1);
}

/// Record one insert call
pub fn record_insert_batch(symbol: &str, rows: usize, duration: Duration) {
    counter!("insert_batches_total").increment(1);
    counter!("rows_inserted_total", "symbol" => symbol.to_string()).increment(rows as u64);
    histogram!("insert_batch_duration_seconds").record(duration.as_secs_f64());
}

/// Times the replace and load of one work unit
#[derive(Debug)]
pub struct UnitLoadMetrics {
    symbol: String,
    start_time: Instant,
}

impl UnitLoadMetrics {
    /// Start timing a unit
    pub fn start(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            start_time: Instant::now(),
        }
    }

    /// Unit finished loading
    pub fn record_done(&self) {
        self.record("done");
    }

    /// Unit failed to load
    pub fn record_failed(&self) {
        self.record("failed");
    }

    fn record(&self, result: &'static str) {
        counter!(
            "unit_loads_total",
            "symbol" => self.symbol.clone(),
            "result" => result,
        )
        .increment(1);
        histogram!("unit_load_duration_seconds", "symbol" => self.symbol.clone())
            .record(self.start_time.elapsed().as_secs_f64());
    }
}

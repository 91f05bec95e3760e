//! Metrics emission.
//!
//! Gauges and counters are emitted as structured tracing events through a
//! pluggable sink, so operators can scrape them from logs and tests can
//! capture them directly.

use std::sync::{Arc, OnceLock, RwLock};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetricValue {
    Counter(u64),
    Gauge(u64),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricEvent {
    pub name: &'static str,
    pub value: MetricValue,
    pub db: Option<String>,
}

pub trait MetricSink: Send + Sync {
    fn record(&self, event: MetricEvent);
}

struct TracingSink;

impl MetricSink for TracingSink {
    fn record(&self, event: MetricEvent) {
        match event.value {
            MetricValue::Counter(value) => {
                tracing::info!(target: "metrics", metric = event.name, value, db = ?event.db);
            }
            MetricValue::Gauge(value) => {
                tracing::info!(target: "metrics", metric = event.name, value, db = ?event.db);
            }
        }
    }
}

static METRIC_SINK: OnceLock<RwLock<Arc<dyn MetricSink>>> = OnceLock::new();

fn sink() -> Arc<dyn MetricSink> {
    let lock = METRIC_SINK.get_or_init(|| RwLock::new(Arc::new(TracingSink)));
    lock.read().unwrap_or_else(|err| err.into_inner()).clone()
}

pub fn set_sink(new_sink: Arc<dyn MetricSink>) {
    let lock = METRIC_SINK.get_or_init(|| RwLock::new(Arc::new(TracingSink)));
    *lock.write().unwrap_or_else(|err| err.into_inner()) = new_sink;
}

pub fn gauge(name: &'static str, value: u64) {
    sink().record(MetricEvent {
        name,
        value: MetricValue::Gauge(value),
        db: None,
    });
}

pub fn db_gauge(name: &'static str, db: &str, value: u64) {
    sink().record(MetricEvent {
        name,
        value: MetricValue::Gauge(value),
        db: Some(db.to_string()),
    });
}

pub fn db_counter(name: &'static str, db: &str, value: u64) {
    sink().record(MetricEvent {
        name,
        value: MetricValue::Counter(value),
        db: Some(db.to_string()),
    });
}

/// Number of managed databases.
pub const DB_COUNT: &str = "skiff_db_count";
/// Primary status of the node (0 or 1).
pub const IS_PRIMARY: &str = "skiff_is_primary";
/// Number of connected subscribers.
pub const SUBSCRIBER_COUNT: &str = "skiff_subscriber_count";
/// LTX files received per database.
pub const DB_LTX_COUNT: &str = "skiff_db_ltx_count";
/// Size of the latest LTX file per database.
pub const DB_LTX_BYTES: &str = "skiff_db_ltx_bytes";

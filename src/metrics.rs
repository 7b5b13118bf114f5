//! Metrics Module
//!
//! Prometheus-compatible metrics for the matching engine:
//! - order flow (consumed, dead-lettered)
//! - heartbeat latency and retries
//! - trades executed

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

/// Metric names as constants for consistency
pub mod names {
    pub const ORDERS_CONSUMED_TOTAL: &str = "orders_consumed_total";
    pub const ORDERS_DEAD_LETTERED_TOTAL: &str = "orders_dead_lettered_total";
    pub const TRADES_EXECUTED_TOTAL: &str = "trades_executed_total";
    pub const HEARTBEAT_DURATION_SECONDS: &str = "heartbeat_duration_seconds";
    pub const HEARTBEAT_RETRIES_TOTAL: &str = "heartbeat_retries_total";
}

/// Label keys
pub mod labels {
    pub const ORDER_SIDE: &str = "side";
    pub const REASON: &str = "reason";
}

/// Install the Prometheus exporter on the given address. When no address is
/// configured the recorder stays uninstalled and every record call is a
/// no-op.
pub fn init_metrics(addr: Option<SocketAddr>) -> anyhow::Result<()> {
    let Some(addr) = addr else {
        return Ok(());
    };

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    info!(%addr, "Prometheus exporter listening");
    Ok(())
}

pub fn record_order_consumed(side: &str) {
    counter!(
        names::ORDERS_CONSUMED_TOTAL,
        labels::ORDER_SIDE => side.to_string()
    )
    .increment(1);
}

pub fn record_dead_letter(reason: &'static str) {
    counter!(
        names::ORDERS_DEAD_LETTERED_TOTAL,
        labels::REASON => reason
    )
    .increment(1);
}

pub fn record_trades(count: u64) {
    if count > 0 {
        counter!(names::TRADES_EXECUTED_TOTAL).increment(count);
    }
}

pub fn record_heartbeat(duration_secs: f64) {
    histogram!(names::HEARTBEAT_DURATION_SECONDS).record(duration_secs);
}

pub fn record_heartbeat_retry() {
    counter!(names::HEARTBEAT_RETRIES_TOTAL).increment(1);
}

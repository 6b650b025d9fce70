use std::net::SocketAddr;

/// Counter: schedule fetches. Labels: status (ok, error, stale).
pub const FETCHES_TOTAL: &str = "houseslot_fetches_total";

/// Counter: booking attempts. Labels: outcome (created, invalid, overlap, conflict, ...).
pub const BOOKINGS_TOTAL: &str = "houseslot_bookings_total";

/// Counter: removal attempts. Labels: outcome.
pub const REMOVALS_TOTAL: &str = "houseslot_removals_total";

/// Histogram: repository call latency in seconds. Labels: op (list, create, delete).
pub const REPOSITORY_DURATION_SECONDS: &str = "houseslot_repository_duration_seconds";

#[derive(Debug)]
pub struct MetricsError(String);

impl std::fmt::Display for MetricsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to install Prometheus metrics exporter: {}", self.0)
    }
}

impl std::error::Error for MetricsError {}

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), MetricsError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError(e.to_string()))?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

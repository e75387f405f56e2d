//! Client metrics
//!
//! Emitted through the `metrics` facade; the embedding application decides
//! whether to install a recorder.
//!
//! - `schwab_token_refresh_total` (counter): label `outcome`
//! - `schwab_transport_rotations_total` (counter)
//! - `schwab_transport_version` (gauge)
//! - `schwab_requests_total` (counter): labels `method`, `status`
//! - `schwab_request_duration_seconds` (histogram)

/// Record one supervisor refresh check.
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("schwab_token_refresh_total", "outcome" => outcome).increment(1);
}

/// Record a published transport rotation.
pub fn record_rotation(version: u64) {
    metrics::counter!("schwab_transport_rotations_total").increment(1);
    metrics::gauge!("schwab_transport_version").set(version as f64);
}

/// Record a completed endpoint call.
pub fn record_request(method: &str, status: u16, duration_secs: f64) {
    metrics::counter!(
        "schwab_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("schwab_request_duration_seconds").record(duration_secs);
}

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

struct Metrics {
    registry: Registry,
    up: IntGauge,
    ws_connections: IntGauge,
    auth_success_total: IntCounter,
    auth_failure_total: IntCounter,
    marks_applied_total: IntCounterVec,
    mark_failures_total: IntCounterVec,
    broadcasts_total: IntCounter,
    sync_queued_total: IntCounter,
    sync_replayed_total: IntCounter,
    sync_abandoned_total: IntCounter,
    cache_errors_total: IntCounter,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

fn metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let registry = Registry::new();

        let up = IntGauge::new("rollcall_up", "Service health").expect("rollcall_up metric");
        let ws_connections = IntGauge::new("ws_connections", "Active websocket connections")
            .expect("ws_connections metric");
        let auth_success_total =
            IntCounter::new("auth_success_total", "Successful credential verifications")
                .expect("auth_success_total metric");
        let auth_failure_total =
            IntCounter::new("auth_failure_total", "Rejected credential verifications")
                .expect("auth_failure_total metric");
        let marks_applied_total = IntCounterVec::new(
            Opts::new("marks_applied_total", "Attendance marks upserted"),
            &["status"],
        )
        .expect("marks_applied_total metric");
        let mark_failures_total = IntCounterVec::new(
            Opts::new("mark_failures_total", "Attendance marks that failed"),
            &["kind"],
        )
        .expect("mark_failures_total metric");
        let broadcasts_total =
            IntCounter::new("broadcasts_total", "Room broadcasts fanned out")
                .expect("broadcasts_total metric");
        let sync_queued_total =
            IntCounter::new("sync_queued_total", "Mutations queued for deferred sync")
                .expect("sync_queued_total metric");
        let sync_replayed_total =
            IntCounter::new("sync_replayed_total", "Queue items replayed to clients")
                .expect("sync_replayed_total metric");
        let sync_abandoned_total = IntCounter::new(
            "sync_abandoned_total",
            "Queue items dropped after the retry ceiling",
        )
        .expect("sync_abandoned_total metric");
        let cache_errors_total =
            IntCounter::new("cache_errors_total", "Cache backend failures tolerated")
                .expect("cache_errors_total metric");

        registry.register(Box::new(up.clone())).expect("register");
        registry
            .register(Box::new(ws_connections.clone()))
            .expect("register");
        registry
            .register(Box::new(auth_success_total.clone()))
            .expect("register");
        registry
            .register(Box::new(auth_failure_total.clone()))
            .expect("register");
        registry
            .register(Box::new(marks_applied_total.clone()))
            .expect("register");
        registry
            .register(Box::new(mark_failures_total.clone()))
            .expect("register");
        registry
            .register(Box::new(broadcasts_total.clone()))
            .expect("register");
        registry
            .register(Box::new(sync_queued_total.clone()))
            .expect("register");
        registry
            .register(Box::new(sync_replayed_total.clone()))
            .expect("register");
        registry
            .register(Box::new(sync_abandoned_total.clone()))
            .expect("register");
        registry
            .register(Box::new(cache_errors_total.clone()))
            .expect("register");

        Metrics {
            registry,
            up,
            ws_connections,
            auth_success_total,
            auth_failure_total,
            marks_applied_total,
            mark_failures_total,
            broadcasts_total,
            sync_queued_total,
            sync_replayed_total,
            sync_abandoned_total,
            cache_errors_total,
        }
    })
}

pub fn inc_ws_connections() {
    metrics().ws_connections.inc();
}

pub fn dec_ws_connections() {
    metrics().ws_connections.dec();
}

pub fn inc_auth_success() {
    metrics().auth_success_total.inc();
}

pub fn inc_auth_failure() {
    metrics().auth_failure_total.inc();
}

pub fn inc_marks_applied(status: &str) {
    metrics().marks_applied_total.with_label_values(&[status]).inc();
}

pub fn inc_mark_failures(kind: &str) {
    metrics().mark_failures_total.with_label_values(&[kind]).inc();
}

pub fn inc_broadcasts() {
    metrics().broadcasts_total.inc();
}

pub fn inc_sync_queued() {
    metrics().sync_queued_total.inc();
}

pub fn inc_sync_replayed(count: u64) {
    metrics().sync_replayed_total.inc_by(count);
}

pub fn inc_sync_abandoned() {
    metrics().sync_abandoned_total.inc();
}

pub fn inc_cache_errors() {
    metrics().cache_errors_total.inc();
}

pub fn metrics_response() -> impl IntoResponse {
    let metrics = metrics();
    metrics.up.set(1);

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder
        .encode(&metrics.registry.gather(), &mut buffer)
        .is_err()
    {
        return (StatusCode::INTERNAL_SERVER_ERROR, HeaderMap::new(), Vec::new());
    }

    let mut headers = HeaderMap::new();
    if let Ok(value) = encoder.format_type().parse() {
        headers.insert(header::CONTENT_TYPE, value);
    }
    (StatusCode::OK, headers, buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_register_once() {
        inc_ws_connections();
        dec_ws_connections();
        inc_sync_abandoned();
        inc_marks_applied("present");
        let families = metrics().registry.gather();
        assert!(families.iter().any(|f| f.get_name() == "sync_abandoned_total"));
    }
}

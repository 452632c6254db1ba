//! Prometheus metrics collection for roomd.
//!
//! Tracks connection churn, event throughput and latency, rejection
//! causes, and room fan-out. Exposed on the `/metrics` HTTP endpoint.

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Client events processed, by event tag.
pub static EVENT_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();

/// Event processing latency by event tag.
pub static EVENT_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Rejected events by event tag and error code.
pub static EVENT_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Currently connected sockets on this instance.
pub static CONNECTED_SOCKETS: OnceLock<IntGauge> = OnceLock::new();

/// Local recipients per notification broadcast.
pub static NOTIFY_FANOUT: OnceLock<Histogram> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at server startup before any metrics are recorded.
pub fn init() {
    let r = registry();

    // Helper macro to register metric
    macro_rules! register {
        ($metric:ident, $init:expr) => {
            let m = $init.expect(concat!(stringify!($metric), " creation failed"));
            if let Err(e) = r.register(Box::new(m.clone())) {
                tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
            }
            let _ = $metric.set(m);
        };
    }

    register!(EVENT_COUNTER, IntCounterVec::new(Opts::new("roomd_event_total", "Client events processed by type"), &["event"]));
    register!(EVENT_LATENCY, HistogramVec::new(
        HistogramOpts::new("roomd_event_duration_seconds", "Event processing latency by type")
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5, 1.0]),
        &["event"]));
    register!(EVENT_ERRORS, IntCounterVec::new(Opts::new("roomd_event_errors_total", "Rejected events by type and cause"), &["event", "error"]));
    register!(CONNECTED_SOCKETS, IntGauge::new("roomd_connected_sockets", "Currently connected sockets"));
    register!(NOTIFY_FANOUT, Histogram::with_opts(
        HistogramOpts::new("roomd_notify_fanout", "Local recipients per notification broadcast")
            .buckets(vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0])));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

/// Record a processed event with latency.
#[inline]
pub fn record_event(event: &str, duration_secs: f64) {
    if let Some(c) = EVENT_COUNTER.get() {
        c.with_label_values(&[event]).inc();
    }
    if let Some(h) = EVENT_LATENCY.get() {
        h.with_label_values(&[event]).observe(duration_secs);
    }
}

/// Record a rejected event.
#[inline]
pub fn record_event_error(event: &str, error: &str) {
    if let Some(c) = EVENT_ERRORS.get() {
        c.with_label_values(&[event, error]).inc();
    }
}

/// Update the connected-sockets gauge.
#[inline]
pub fn set_connected_sockets(count: usize) {
    if let Some(g) = CONNECTED_SOCKETS.get() {
        g.set(count as i64);
    }
}

/// Record how many local members a broadcast reached.
#[inline]
pub fn record_fanout(recipients: usize) {
    if let Some(h) = NOTIFY_FANOUT.get() {
        h.observe(recipients as f64);
    }
}

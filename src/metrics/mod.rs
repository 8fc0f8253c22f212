/*!
 * # Metrics Module
 *
 * Prometheus counters for the fulfillment and ledger transitions, exposed in
 * the text exposition format at `/metrics`.
 *
 * Database timings go through the `metrics` facade in [`crate::db`]; they are
 * only recorded when a recorder is installed.
 */

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::{error, warn};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    /// Transitions by operation and outcome (`applied`, `noop`, `failed`)
    pub static ref TRANSITIONS: IntCounterVec = register_int_counter_vec(
        "stock_ledger_transitions_total",
        "State transitions processed, by operation and outcome",
        &["operation", "outcome"],
    );

    pub static ref TRANSITION_RETRIES: IntCounter = register_int_counter(
        "stock_ledger_transition_retries_total",
        "Transitions re-run after losing an optimistic-lock race",
    );

    pub static ref LEDGER_MOVEMENTS: IntCounterVec = register_int_counter_vec(
        "stock_ledger_movements_total",
        "Ledger rows appended, by movement type",
        &["type"],
    );

    pub static ref IDEMPOTENT_REPLAYS: IntCounter = register_int_counter(
        "stock_ledger_idempotent_replays_total",
        "Keyed movements found already applied",
    );

    pub static ref EVENT_PUBLISH_FAILURES: IntCounter = register_int_counter(
        "stock_ledger_event_publish_failures_total",
        "Domain events that could not be delivered to the event channel",
    );
}

/// Creates an `IntCounter` and registers it with [`REGISTRY`].
pub fn register_int_counter(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("metric can be created");
    if let Err(e) = REGISTRY.register(Box::new(counter.clone())) {
        warn!(metric = name, error = %e, "Failed to register counter");
    }
    counter
}

pub fn register_int_counter_vec(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    let counter = IntCounterVec::new(Opts::new(name, help), labels).expect("metric can be created");
    if let Err(e) = REGISTRY.register(Box::new(counter.clone())) {
        warn!(metric = name, error = %e, "Failed to register counter vec");
    }
    counter
}

pub fn record_transition(operation: &str, outcome: &str) {
    TRANSITIONS.with_label_values(&[operation, outcome]).inc();
}

/// Renders every registered metric in the Prometheus text format.
pub fn render() -> Result<String, prometheus::Error> {
    // Touch the statics so they appear even before the first transition.
    lazy_static::initialize(&TRANSITIONS);
    lazy_static::initialize(&TRANSITION_RETRIES);
    lazy_static::initialize(&LEDGER_MOVEMENTS);
    lazy_static::initialize(&IDEMPOTENT_REPLAYS);
    lazy_static::initialize(&EVENT_PUBLISH_FAILURES);

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// `GET /metrics`
pub async fn metrics_handler() -> Response {
    match render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

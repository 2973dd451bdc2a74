use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::state::AppState;

pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tourdesk_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Prometheus counters served at `/metrics`. Each state gets its own registry.
pub struct Metrics {
    registry: Registry,
    pub bookings_created: IntCounter,
    pub payments_recorded: IntCounterVec,
    pub http_requests: IntCounterVec,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let bookings_created = IntCounter::new("tourdesk_bookings_created_total", "Bookings created")?;
        let payments_recorded = IntCounterVec::new(
            Opts::new("tourdesk_payments_recorded_total", "Payments recorded by method"),
            &["method"],
        )?;
        let http_requests = IntCounterVec::new(
            Opts::new("tourdesk_http_requests_total", "HTTP responses by status class"),
            &["class"],
        )?;

        registry.register(Box::new(bookings_created.clone()))?;
        registry.register(Box::new(payments_recorded.clone()))?;
        registry.register(Box::new(http_requests.clone()))?;

        Ok(Self {
            registry,
            bookings_created,
            payments_recorded,
            http_requests,
        })
    }

    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn status_class(status: StatusCode) -> &'static str {
    match status.as_u16() {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

pub async fn track_requests(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let response = next.run(req).await;
    state
        .metrics
        .http_requests
        .with_label_values(&[status_class(response.status())])
        .inc();
    response
}

pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_the_exposition() {
        let metrics = Metrics::new().unwrap();
        metrics.bookings_created.inc();
        metrics.payments_recorded.with_label_values(&["cash"]).inc();

        let text = metrics.render().unwrap();
        assert!(text.contains("tourdesk_bookings_created_total 1"));
        assert!(text.contains("tourdesk_payments_recorded_total{method=\"cash\"} 1"));
    }

    #[test]
    fn statuses_are_grouped_by_class() {
        assert_eq!(status_class(StatusCode::OK), "2xx");
        assert_eq!(status_class(StatusCode::UNPROCESSABLE_ENTITY), "4xx");
        assert_eq!(status_class(StatusCode::SERVICE_UNAVAILABLE), "5xx");
    }
}

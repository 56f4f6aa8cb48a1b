use axum::{extract::Request, middleware::Next, response::Response};
use metrics::{counter, histogram};
use std::time::Instant;

/// Per-request counters and latency histogram for the operational HTTP
/// surface (health, readiness, metrics, admin cache hooks).
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    let duration = start.elapsed();
    let status = response.status().as_u16().to_string();

    let labels = [("method", method), ("path", path), ("status", status)];

    counter!("ledger_http_requests_total", &labels).increment(1);
    histogram!("ledger_http_request_duration_seconds", &labels).record(duration.as_secs_f64());

    response
}

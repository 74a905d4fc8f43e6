use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use tracing::{info, info_span, warn, Instrument};
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

/// Wraps each HTTP request in a span so dispatcher audit lines carry the route.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let span = info_span!("http_request", method = %method, path = %path);
    let started_at = Instant::now();

    let response = next.run(request).instrument(span.clone()).await;
    let status = response.status();
    let elapsed_ms = started_at.elapsed().as_millis();

    span.in_scope(|| {
        if status.is_server_error() {
            warn!(status = status.as_u16(), duration_ms = elapsed_ms, "request failed");
        } else {
            info!(
                status = status.as_u16(),
                duration_ms = elapsed_ms,
                empty_body = status == axum::http::StatusCode::NO_CONTENT,
                "request summary"
            );
        }
    });

    response
}

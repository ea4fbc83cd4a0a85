//! The top-level router: health checks, metrics, the Slack endpoints under `/bot`, and the per-request
//! context middleware.

use std::{sync::Arc, time::Instant};

use axum::{
    Router,
    body::HttpBody,
    extract::{MatchedPath, Request, State},
    http::{HeaderName, HeaderValue, StatusCode, header},
    middleware::{Next, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::get,
};
use devopsbot_core::Context;
use devopsbot_telemetry::{SharedMetrics, access_log_level};
use security::SlackVerifier;
use tower_http::compression::CompressionLayer;
use tracing::{Instrument, error, field};
use uuid::Uuid;

use crate::bot::{self, BotState};

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
const MAX_REQUEST_ID_LEN: usize = 128;

/// Correlation id of the request a context was created for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

pub fn router(bot: BotState, verifier: Arc<SlackVerifier>) -> Router {
    let metrics = bot.metrics.clone();
    Router::new()
        .route("/live", get(live))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics_text))
        .with_state(metrics.clone())
        .nest("/bot", bot::routes(bot, verifier))
        .layer(from_fn_with_state(metrics, request_context))
        .layer(CompressionLayer::new())
}

async fn live() -> &'static str {
    "ok"
}

async fn ready() -> &'static str {
    "ready"
}

async fn metrics_text(State(metrics): State<SharedMetrics>) -> Response {
    match metrics.encode_text() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn request_id(req: &Request) -> String {
    req.headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Builds the request [`Context`] (span plus request id), runs the request inside it, then
/// writes the access log line and counts the request.
async fn request_context(
    State(metrics): State<SharedMetrics>,
    mut req: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let rid = request_id(&req);
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let span = tracing::info_span!(
        "request",
        request_id = %rid,
        method = %method,
        path = %path,
        user_id = field::Empty,
        user_name = field::Empty,
        channel_id = field::Empty,
        channel_name = field::Empty,
        command = field::Empty,
    );
    let ctx = Context::background()
        .with_span(span.clone())
        .with_value(RequestId(rid.clone()));
    let _guard = ctx.drop_guard();
    req.extensions_mut().insert(ctx);

    let mut res = next.run(req).instrument(span.clone()).await;
    if let Ok(value) = HeaderValue::from_str(&rid) {
        res.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    let status = res.status();
    let size = res.body().size_hint().exact();
    let duration_ms = started.elapsed().as_millis() as u64;
    let _entered = span.enter();
    devopsbot_telemetry::access_event!(
        access_log_level(&path, status),
        status = status.as_u16(),
        method = %method,
        path = %path,
        duration_ms,
        size = ?size,
        "request completed"
    );
    metrics.http_request(&route, status.as_u16());
    res
}

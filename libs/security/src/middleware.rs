use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use time::OffsetDateTime;
use tracing::{debug, error};

use crate::signature::{SignedHeaders, SlackVerifier};

/// Upper bound for a buffered webhook body. Slack payloads stay far below this.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// axum middleware rejecting requests that do not carry a valid Slack signature.
///
/// Mount with `axum::middleware::from_fn_with_state(verifier, verify_slack_request)`.
/// Authentication failures answer `404 Not Found`; a body that cannot be read answers `500`.
pub async fn verify_slack_request(
    State(verifier): State<Arc<SlackVerifier>>,
    request: Request,
    next: Next,
) -> Response {
    let received_at = OffsetDateTime::now_utc();
    let (parts, body) = request.into_parts();

    let signed = match SignedHeaders::from_headers(&parts.headers) {
        Ok(signed) => signed,
        Err(err) => {
            debug!(error = %err, path = %parts.uri.path(), "rejecting unsigned request");
            return StatusCode::NOT_FOUND.into_response();
        }
    };
    if let Err(err) = verifier.check_freshness(&signed, received_at) {
        debug!(error = %err, path = %parts.uri.path(), "rejecting stale request");
        return StatusCode::NOT_FOUND.into_response();
    }

    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            error!(error = %err, path = %parts.uri.path(), "failed to read request body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if let Err(err) = verifier.ensure(&signed, &bytes) {
        debug!(error = %err, path = %parts.uri.path(), "rejecting request with bad signature");
        return StatusCode::NOT_FOUND.into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

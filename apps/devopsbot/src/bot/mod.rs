//! Slack webhook handlers: slash commands and modal interactions.
//!
//! Both endpoints sit behind [`security::verify_slack_request`], so handlers only ever see
//! authentic Slack traffic.

pub mod command;
pub mod incident;
pub mod interactive;
pub mod modals;
pub mod tasks;
pub mod validate;

use std::sync::Arc;

use axum::{
    Json, Router,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::post,
};
use devopsbot_core::slack::SlackClient;
use devopsbot_telemetry::SharedMetrics;
use security::{SlackVerifier, verify_slack_request};
use serde_json::json;
use tracing::warn;

use crate::{config::BotConfig, i18n::Catalogs};
use tasks::TaskRunner;
use validate::FieldErrors;

/// Incident settings the handlers need.
#[derive(Debug, Clone, Default)]
pub struct BotOptions {
    pub broadcast_channel_id: String,
    pub doc_template_url: String,
    pub environments: Vec<String>,
    pub regions: Vec<String>,
    pub severity_levels: Vec<String>,
    pub impact_levels: Vec<String>,
}

impl From<&BotConfig> for BotOptions {
    fn from(config: &BotConfig) -> Self {
        Self {
            broadcast_channel_id: config.slack.broadcast_channel_id.clone(),
            doc_template_url: config.incident.doc_template_url.clone(),
            environments: config.incident.environments.clone(),
            regions: config.incident.regions.clone(),
            severity_levels: config.incident.severity_levels.clone(),
            impact_levels: config.incident.impact_levels.clone(),
        }
    }
}

#[derive(Clone)]
pub struct BotState {
    pub slack: Arc<dyn SlackClient>,
    pub options: Arc<BotOptions>,
    pub catalogs: Arc<Catalogs>,
    pub tasks: TaskRunner,
    pub metrics: SharedMetrics,
}

/// `/command` and `/interactive`, wrapped in signature verification.
pub fn routes(state: BotState, verifier: Arc<SlackVerifier>) -> Router {
    Router::new()
        .route("/command", post(command::handle_command))
        .route("/interactive", post(interactive::handle_interactive))
        .layer(from_fn_with_state(verifier, verify_slack_request))
        .with_state(state)
}

/// Keeps the modal open and highlights the offending fields.
pub(crate) fn field_errors(errors: FieldErrors) -> Response {
    let body = json!({ "response_action": "errors", "errors": errors });
    warn!(errors = %body["errors"], "Modal validation error");
    (StatusCode::OK, Json(body)).into_response()
}

/// An ephemeral reply in the body of a slash command response.
pub(crate) fn ephemeral(text: String) -> Response {
    (
        StatusCode::OK,
        Json(json!({ "response_type": "ephemeral", "text": text })),
    )
        .into_response()
}

use axum::{
    Extension,
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use devopsbot_core::{
    Context,
    slack::{SlashCommand, blocks::ModalView, client::all_conversations_for_user},
};
use security::middleware::MAX_BODY_BYTES;
use serde_json::json;
use tracing::{error, info, warn};

use super::{BotState, ephemeral, modals, validate};
use crate::i18n::{Localizer, Msg};

/// Commands must end with this, e.g. `/devopsbot` or `/staging-devopsbot`.
pub const COMMAND_SUFFIX: &str = "devopsbot";

pub async fn handle_command(
    State(state): State<BotState>,
    Extension(ctx): Extension<Context>,
    request: Request,
) -> Response {
    let body = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(err) => {
            error!(error = %err, "failed to read command body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let cmd: SlashCommand = match serde_urlencoded::from_bytes(&body) {
        Ok(cmd) => cmd,
        Err(err) => {
            error!(error = %err, "failed to parse command");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let span = ctx.span();
    span.record("user_id", cmd.user_id.as_str());
    span.record("user_name", cmd.user_name.as_str());
    span.record("channel_id", cmd.channel_id.as_str());
    span.record("channel_name", cmd.channel_name.as_str());
    span.record("command", cmd.command.as_str());

    if !cmd.command.ends_with(COMMAND_SUFFIX) {
        warn!(command = %cmd.command, "unknown command");
        return StatusCode::NOT_FOUND.into_response();
    }

    let user = match state.slack.user_info(&cmd.user_id).await {
        Ok(user) => user,
        Err(err) => {
            error!(error = %err, "failed to get user info");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let l10n = state
        .catalogs
        .localizer(user.locale.as_deref().unwrap_or_default());
    let ctx = ctx.with_value(l10n.clone());

    info!(text = %cmd.text, language = l10n.language(), "command received");
    match cmd.action() {
        "incident" => {
            let modal = modals::declare_modal(&l10n, &state.options, &cmd.channel_id, None);
            open_modal(&state, &ctx, &cmd, &modal).await
        }
        "resolve" => {
            let modal = modals::resolve_modal(&l10n, &state.options, &cmd.channel_id, None);
            open_modal(&state, &ctx, &cmd, &modal).await
        }
        "list" => list_incidents(&state, &l10n).await,
        _ => ephemeral(l10n.text(Msg::HelpMessage)),
    }
}

async fn open_modal(
    state: &BotState,
    ctx: &Context,
    cmd: &SlashCommand,
    modal: &ModalView,
) -> Response {
    match ctx.instrument(state.slack.open_view(&cmd.trigger_id, modal)).await {
        Ok(view) => {
            info!(view_id = %view.id, callback_id = %modal.callback_id, "modal opened");
            StatusCode::OK.into_response()
        }
        Err(err) => {
            error!(error = %err, callback_id = %modal.callback_id, "failed to open modal");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn list_incidents(state: &BotState, l10n: &Localizer) -> Response {
    let channels = match all_conversations_for_user(state.slack.as_ref()).await {
        Ok(channels) => channels,
        Err(err) => {
            error!(error = %err, "failed to list bot conversations");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let open: Vec<String> = channels
        .iter()
        .filter(|c| !c.is_archived && validate::is_incident_channel(&c.name))
        .map(|c| format!("> <#{}>", c.id))
        .collect();
    if open.is_empty() {
        return ephemeral(l10n.text(Msg::NoOpenIncidents));
    }
    ephemeral(l10n.render(
        Msg::OpenIncidents,
        &json!({ "channels": open.join("\n") }),
    ))
}

use axum::{
    Extension,
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use devopsbot_core::{
    Context,
    slack::{BlockAction, InteractionCallback, InteractionType, blocks::ModalView},
};
use security::middleware::MAX_BODY_BYTES;
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::{error, info, warn};

use super::{
    BotState, field_errors,
    incident::{self, DeclareInput, ResolveInput},
    modals::{self, DECLARE_CALLBACK, INCIDENT_CHANNEL_BLOCK, INCIDENT_NAME_BLOCK, RESOLVE_CALLBACK},
    validate,
};
use crate::i18n::{Localizer, Msg};

const NAME_TAKEN: &str = "name_taken";

#[derive(Debug, Deserialize)]
struct InteractionForm {
    payload: String,
}

pub async fn handle_interactive(
    State(state): State<BotState>,
    Extension(ctx): Extension<Context>,
    request: Request,
) -> Response {
    let body = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(err) => {
            error!(error = %err, "failed to read interactive body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let callback = match parse_payload(&body) {
        Ok(callback) => callback,
        Err(err) => {
            error!(error = %err, "failed to parse interactive payload");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    ctx.span().record("user_id", callback.user.id.as_str());
    let l10n = localizer_for(&state, &callback.user.id).await;
    let ctx = ctx.with_value(l10n.clone());

    match callback.kind {
        InteractionType::BlockActions => {
            let Some(action) = callback.actions.first() else {
                warn!("block_actions payload without actions");
                return StatusCode::BAD_REQUEST.into_response();
            };
            block_action(&state, &l10n, &callback, action).await
        }
        InteractionType::ViewSubmission => match callback.view.callback_id.as_str() {
            "" => {
                error!("callbackID empty");
                StatusCode::BAD_REQUEST.into_response()
            }
            DECLARE_CALLBACK => declare(&state, &ctx, &l10n, &callback).await,
            RESOLVE_CALLBACK => resolve(&state, &ctx, &l10n, &callback).await,
            other => {
                error!(callback_id = %other, "unknown callbackID");
                StatusCode::BAD_REQUEST.into_response()
            }
        },
        other => {
            warn!(payload_type = ?other, "unknown interactive payload type");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

fn parse_payload(body: &[u8]) -> anyhow::Result<InteractionCallback> {
    let form: InteractionForm = serde_urlencoded::from_bytes(body)?;
    Ok(serde_json::from_str(&form.payload)?)
}

/// The user's localizer; English when the profile cannot be fetched.
async fn localizer_for(state: &BotState, user_id: &str) -> Localizer {
    match state.slack.user_info(user_id).await {
        Ok(user) => state
            .catalogs
            .localizer(user.locale.as_deref().unwrap_or_default()),
        Err(err) => {
            warn!(error = %err, "failed to get user info, using default language");
            state.catalogs.default_localizer()
        }
    }
}

/// Live validation while the modal is being edited.
async fn block_action(
    state: &BotState,
    l10n: &Localizer,
    callback: &InteractionCallback,
    action: &BlockAction,
) -> Response {
    let view = &callback.view;
    let modal = match action.block_id.as_str() {
        INCIDENT_NAME_BLOCK => {
            let name = validate::incident_channel_name(action.state.text(), OffsetDateTime::now_utc());
            let hint = match validate::validate_incident_channel_name(l10n, INCIDENT_NAME_BLOCK, &name)
            {
                Ok(()) => l10n.with_name(Msg::IncidentChannelNamePreview, &name),
                Err(mut errors) => errors.remove(INCIDENT_NAME_BLOCK).unwrap_or_default(),
            };
            modals::declare_modal(l10n, &state.options, &view.private_metadata, Some(&hint))
        }
        INCIDENT_CHANNEL_BLOCK => {
            let channel_id = action.state.conversation().unwrap_or_default();
            let name = match state.slack.conversation_info(channel_id).await {
                Ok(channel) => channel.name,
                Err(err) => {
                    warn!(error = %err, channel_id, "failed to look up chosen channel");
                    channel_id.to_string()
                }
            };
            let hint = validate::validate_chosen_incident_channel_name(
                l10n,
                INCIDENT_CHANNEL_BLOCK,
                &name,
            )
            .err()
            .and_then(|mut errors| errors.remove(INCIDENT_CHANNEL_BLOCK));
            modals::resolve_modal(
                l10n,
                &state.options,
                &view.private_metadata,
                hint.as_deref(),
            )
        }
        other => {
            error!(block_id = %other, "unknown BlockID");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };
    update_view(state, callback, &modal).await
}

async fn update_view(state: &BotState, callback: &InteractionCallback, modal: &ModalView) -> Response {
    let view = &callback.view;
    let hash = (!view.hash.is_empty()).then_some(view.hash.as_str());
    match state.slack.update_view(&view.id, hash, modal).await {
        Ok(_) => StatusCode::OK.into_response(),
        Err(err) => {
            error!(error = %err, view_id = %view.id, "Error updating view");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Validates, creates the channel, then hands the rest to the task runner.
async fn declare(
    state: &BotState,
    ctx: &Context,
    l10n: &Localizer,
    callback: &InteractionCallback,
) -> Response {
    let input = DeclareInput::from_submission(callback, OffsetDateTime::now_utc());
    if let Err(errors) = input.validate(l10n) {
        return field_errors(errors);
    }

    let channel = match state
        .slack
        .create_conversation(&input.channel_name, input.security)
        .await
    {
        Ok(channel) => channel,
        Err(err) => {
            warn!(error = %err, channel_name = %input.channel_name, "failed to create incident channel");
            let message = if err.is(NAME_TAKEN) {
                l10n.with_name(Msg::ChannelNameTaken, &input.channel_name)
            } else {
                l10n.render(
                    Msg::ChannelCreateFailed,
                    &serde_json::json!({
                        "name": input.channel_name,
                        "error": err.code().map(str::to_string).unwrap_or_else(|| err.to_string()),
                    }),
                )
            };
            return field_errors(validate::single(INCIDENT_NAME_BLOCK, message));
        }
    };

    info!(
        channel_id = %channel.id,
        channel_name = %channel.name,
        private = input.security,
        "incident declared"
    );
    state.metrics.incident("declared");
    let public = state.catalogs.default_localizer();
    let sequence = incident::declare_sequence(&input, &channel, &state.options, &public, l10n);
    state.tasks.spawn_sequence(ctx, sequence);
    StatusCode::ACCEPTED.into_response()
}

async fn resolve(
    state: &BotState,
    ctx: &Context,
    l10n: &Localizer,
    callback: &InteractionCallback,
) -> Response {
    let input = ResolveInput::from_submission(callback);
    let name = match state.slack.conversation_info(&input.channel_id).await {
        Ok(channel) => channel.name,
        Err(err) => {
            warn!(error = %err, channel_id = %input.channel_id, "failed to look up chosen channel");
            input.channel_id.clone()
        }
    };
    if let Err(errors) =
        validate::validate_chosen_incident_channel_name(l10n, INCIDENT_CHANNEL_BLOCK, &name)
    {
        return field_errors(errors);
    }

    info!(channel_id = %input.channel_id, archive = input.archive, "incident resolved");
    state.metrics.incident("resolved");
    let public = state.catalogs.default_localizer();
    let sequence = incident::resolve_sequence(&input, &state.options, &public, l10n);
    state.tasks.spawn_sequence(ctx, sequence);
    StatusCode::ACCEPTED.into_response()
}

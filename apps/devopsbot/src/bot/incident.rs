//! Incident inputs parsed from modal submissions, and the step lists they turn into.

use devopsbot_core::slack::{Channel, InteractionCallback, OutgoingMessage, ViewState};
use serde_json::json;
use time::OffsetDateTime;

use super::{
    BotOptions,
    modals::{
        ARCHIVE_BLOCK, ARCHIVE_YES, COMMANDER_BLOCK, ENVIRONMENT_BLOCK, IMPACT_BLOCK,
        INCIDENT_CHANNEL_BLOCK, INCIDENT_NAME_BLOCK, INVITEES_BLOCK, REGION_BLOCK,
        RESOLUTION_BLOCK, RESPONDER_BLOCK, SECURITY_BLOCK, SECURITY_YES, SEVERITY_BLOCK,
        SUMMARY_BLOCK,
    },
    tasks::{Action, Notify, Sequence, Step},
    validate::{self, FieldErrors},
};
use crate::i18n::{Localizer, Msg};

/// Slack natural-language schedule of the progress reminder.
pub const REMINDER_SCHEDULE: &str = "Every 30 min";

pub const DECLARE_SEQUENCE: &str = "declare";
pub const RESOLVE_SEQUENCE: &str = "resolve";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeclareInput {
    /// The name as typed.
    pub name: String,
    /// `inc_<name>_<date>`.
    pub channel_name: String,
    pub security: bool,
    pub responder: String,
    pub commander: String,
    pub invitees: Vec<String>,
    pub environments: Vec<String>,
    pub regions: Vec<String>,
    pub severity: Option<String>,
    pub impact: Option<String>,
    pub summary: String,
    pub declarer: String,
    /// Channel the command was typed in, carried in the modal's private metadata.
    pub origin_channel: String,
}

impl DeclareInput {
    pub fn from_submission(callback: &InteractionCallback, date: OffsetDateTime) -> Self {
        let state = &callback.view.state;
        let name = text(state, INCIDENT_NAME_BLOCK);
        Self {
            channel_name: validate::incident_channel_name(&name, date),
            name,
            security: state
                .block(SECURITY_BLOCK)
                .map(|v| v.selected_values().iter().any(|s| s == SECURITY_YES))
                .unwrap_or(false),
            responder: user(state, RESPONDER_BLOCK),
            commander: user(state, COMMANDER_BLOCK),
            invitees: state
                .block(INVITEES_BLOCK)
                .map(|v| v.selected_users.clone())
                .unwrap_or_default(),
            environments: selected(state, ENVIRONMENT_BLOCK),
            regions: selected(state, REGION_BLOCK),
            severity: choice(state, SEVERITY_BLOCK),
            impact: choice(state, IMPACT_BLOCK),
            summary: text(state, SUMMARY_BLOCK),
            declarer: callback.user.id.clone(),
            origin_channel: callback.view.private_metadata.clone(),
        }
    }

    /// Field errors keyed by block id; an empty name is reported against the derived channel name.
    pub fn validate(&self, l10n: &Localizer) -> Result<(), FieldErrors> {
        if self.name.is_empty() {
            return Err(validate::single(
                INCIDENT_NAME_BLOCK,
                l10n.with_name(Msg::IncidentChannelNameInvalid, &self.channel_name),
            ));
        }
        validate::validate_incident_channel_name(l10n, INCIDENT_NAME_BLOCK, &self.channel_name)
    }

    /// Responder, commander and invitees in that order, without blanks or repeats.
    pub fn participants(&self) -> Vec<String> {
        let mut users: Vec<String> = Vec::new();
        for user in [&self.responder, &self.commander]
            .into_iter()
            .chain(self.invitees.iter())
        {
            if !user.is_empty() && !users.contains(user) {
                users.push(user.clone());
            }
        }
        users
    }

    fn overview_data(&self, l10n: &Localizer, channel_id: &str) -> serde_json::Value {
        let security = if self.security {
            l10n.text(Msg::SecurityIncidentNotice)
        } else {
            String::new()
        };
        json!({
            "summary": self.summary,
            "environments": self.environments.join(", "),
            "regions": self.regions.join(", "),
            "severity": self.severity.clone().unwrap_or_default(),
            "impact": self.impact.clone().unwrap_or_default(),
            "responder": self.responder,
            "commander": self.commander,
            "declarer": self.declarer,
            "channel": channel_id,
            "security": security,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolveInput {
    pub channel_id: String,
    pub archive: bool,
    pub resolution: String,
    pub resolver: String,
    pub origin_channel: String,
}

impl ResolveInput {
    pub fn from_submission(callback: &InteractionCallback) -> Self {
        let state = &callback.view.state;
        Self {
            channel_id: state
                .block(INCIDENT_CHANNEL_BLOCK)
                .and_then(|v| v.conversation())
                .unwrap_or_default()
                .to_string(),
            archive: choice(state, ARCHIVE_BLOCK).as_deref() == Some(ARCHIVE_YES),
            resolution: text(state, RESOLUTION_BLOCK),
            resolver: callback.user.id.clone(),
            origin_channel: callback.view.private_metadata.clone(),
        }
    }
}

fn text(state: &ViewState, block: &str) -> String {
    state
        .block(block)
        .map(|v| v.text().to_string())
        .unwrap_or_default()
}

fn user(state: &ViewState, block: &str) -> String {
    state
        .block(block)
        .and_then(|v| v.selected_user.clone())
        .unwrap_or_default()
}

fn selected(state: &ViewState, block: &str) -> Vec<String> {
    state
        .block(block)
        .map(|v| v.selected_values())
        .unwrap_or_default()
}

fn choice(state: &ViewState, block: &str) -> Option<String> {
    state
        .block(block)
        .and_then(|v| v.selected_value())
        .map(str::to_string)
}

/// Progress notices go to the broadcast channel when one is configured, otherwise to the channel
/// the command came from.
fn notify_target(options: &BotOptions, origin_channel: &str, user: &str) -> Notify {
    let channel = if options.broadcast_channel_id.is_empty() {
        origin_channel
    } else {
        options.broadcast_channel_id.as_str()
    };
    Notify {
        channel: channel.to_string(),
        user: user.to_string(),
    }
}

fn join_broadcast(options: &BotOptions) -> Option<Step> {
    (!options.broadcast_channel_id.is_empty()).then(|| {
        Step::new(
            "join_broadcast",
            Action::JoinChannel {
                channel: options.broadcast_channel_id.clone(),
            },
        )
        .notify_on_failure(Msg::FailedJoinBroadcast)
    })
}

fn notice(notify: &Notify, text: String) -> Action {
    Action::Post(OutgoingMessage::ephemeral(
        &notify.channel,
        &notify.user,
        text,
    ))
}

/// Everything that happens after the incident channel exists. Public messages are rendered with
/// `public`; notices to the declarer with `user`.
pub fn declare_sequence(
    input: &DeclareInput,
    channel: &Channel,
    options: &BotOptions,
    public: &Localizer,
    user: &Localizer,
) -> Sequence {
    let notify = notify_target(options, &input.origin_channel, &input.declarer);
    let data = input.overview_data(public, &channel.id);
    let overview = public.render(Msg::IncidentOverview, &data);
    let updates_channel = if options.broadcast_channel_id.is_empty() {
        &channel.id
    } else {
        &options.broadcast_channel_id
    };

    let mut steps: Vec<Step> = join_broadcast(options).into_iter().collect();
    steps.push(Step::new(
        "started_notice",
        notice(
            &notify,
            user.render(Msg::StartedDeclaring, &json!({ "channel": channel.id })),
        ),
    ));
    steps.push(
        Step::new(
            "set_purpose",
            Action::SetPurpose {
                channel: channel.id.clone(),
                text: overview.clone(),
            },
        )
        .notify_on_failure(Msg::FailedSetPurpose),
    );
    steps.push(
        Step::new(
            "set_topic",
            Action::SetTopic {
                channel: channel.id.clone(),
                text: overview,
            },
        )
        .notify_on_failure(Msg::FailedSetTopic),
    );
    steps.push(
        Step::new(
            "invite",
            Action::Invite {
                channel: channel.id.clone(),
                users: input.participants(),
            },
        )
        .notify_on_failure(Msg::FailedInvite),
    );
    if !options.broadcast_channel_id.is_empty() {
        steps.push(
            Step::new(
                "announce",
                Action::Post(OutgoingMessage::channel(
                    &options.broadcast_channel_id,
                    public.render(Msg::IncidentAnnouncement, &data),
                )),
            )
            .notify_on_failure(Msg::FailedAnnounce),
        );
    }
    steps.push(
        Step::new(
            "start_call",
            Action::Post(OutgoingMessage::channel(
                &channel.id,
                public.render(
                    Msg::StartCall,
                    &json!({ "commander": input.commander, "channelName": channel.name }),
                ),
            )),
        )
        .notify_on_failure(Msg::FailedStartCall),
    );
    if !options.doc_template_url.is_empty() {
        steps.push(
            Step::new(
                "incident_doc",
                Action::Post(OutgoingMessage::channel(
                    &channel.id,
                    public.render(
                        Msg::StartIncidentDoc,
                        &json!({ "commander": input.commander, "url": options.doc_template_url }),
                    ),
                )),
            )
            .notify_on_failure(Msg::FailedIncidentDoc),
        );
    }
    steps.push(
        Step::new(
            "reminder",
            Action::Remind {
                channel: channel.id.clone(),
                text: public.render(
                    Msg::ProgressReminder,
                    &json!({ "commander": input.commander, "broadcastChannel": updates_channel }),
                ),
                time: REMINDER_SCHEDULE.to_string(),
            },
        )
        .notify_on_failure(Msg::FailedReminder),
    );
    steps.push(Step::new(
        "finished_notice",
        notice(
            &notify,
            user.render(
                Msg::FinishedDeclaring,
                &json!({ "channelName": channel.name }),
            ),
        ),
    ));

    Sequence {
        name: DECLARE_SEQUENCE,
        notify,
        steps,
    }
}

pub fn resolve_sequence(
    input: &ResolveInput,
    options: &BotOptions,
    public: &Localizer,
    user: &Localizer,
) -> Sequence {
    let notify = notify_target(options, &input.origin_channel, &input.resolver);
    let channel = json!({ "channel": input.channel_id });

    let mut steps: Vec<Step> = join_broadcast(options).into_iter().collect();
    steps.push(Step::new(
        "started_notice",
        notice(&notify, user.render(Msg::StartedResolving, &channel)),
    ));
    if !options.broadcast_channel_id.is_empty() {
        steps.push(
            Step::new(
                "announce_resolution",
                Action::Post(OutgoingMessage::channel(
                    &options.broadcast_channel_id,
                    public.render(
                        Msg::IncidentResolved,
                        &json!({ "channel": input.channel_id, "resolution": input.resolution }),
                    ),
                )),
            )
            .notify_on_failure(Msg::FailedAnnounceResolution),
        );
    }
    if input.archive {
        steps.push(
            Step::new(
                "archive",
                Action::Archive {
                    channel: input.channel_id.clone(),
                    requested_by: Some(input.resolver.clone()),
                },
            )
            .notify_on_failure(Msg::FailedArchive),
        );
    }
    steps.push(Step::new(
        "finished_notice",
        notice(&notify, user.render(Msg::FinishedResolving, &channel)),
    ));

    Sequence {
        name: RESOLVE_SEQUENCE,
        notify,
        steps,
    }
}

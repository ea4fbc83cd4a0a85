//! The declare and resolve modals.

use devopsbot_core::slack::{
    blocks::{Block, ConversationFilter, Element, ModalView, OptionObject, Text},
    plain_option,
};
use serde_json::json;

use super::BotOptions;
use crate::i18n::{Localizer, Msg};

pub const DECLARE_CALLBACK: &str = "declare_incident";
pub const RESOLVE_CALLBACK: &str = "resolve_incident";

pub const CONTEXT_BLOCK: &str = "context";
pub const INCIDENT_NAME_BLOCK: &str = "incident_name";
pub const SECURITY_BLOCK: &str = "security_incident";
pub const RESPONDER_BLOCK: &str = "incident_responder";
pub const COMMANDER_BLOCK: &str = "incident_commander";
pub const ENVIRONMENT_BLOCK: &str = "incident_environment_affected";
pub const REGION_BLOCK: &str = "incident_region_affected";
pub const SEVERITY_BLOCK: &str = "incident_severity";
pub const IMPACT_BLOCK: &str = "incident_impact";
pub const SUMMARY_BLOCK: &str = "incident_summary";
pub const INVITEES_BLOCK: &str = "incident_invitees";

pub const INCIDENT_CHANNEL_BLOCK: &str = "incident_channel";
pub const ARCHIVE_BLOCK: &str = "archive_choice";
pub const RESOLUTION_BLOCK: &str = "resolution";

/// Value of the security checkbox when ticked.
pub const SECURITY_YES: &str = "yes";
pub const ARCHIVE_YES: &str = "yes";
pub const ARCHIVE_NO: &str = "no";

const INCIDENT_NAME_MAX: u32 = 60;
const FREE_TEXT_MAX: u32 = 200;

/// Builds the declare modal. `origin_channel` travels in `private_metadata`; `name_hint`
/// replaces the default hint under the incident name.
pub fn declare_modal(
    l10n: &Localizer,
    options: &BotOptions,
    origin_channel: &str,
    name_hint: Option<&str>,
) -> ModalView {
    let description = l10n.render(
        Msg::IncidentCreationDescription,
        &json!({ "broadcastChannel": options.broadcast_channel_id }),
    );

    let mut modal = ModalView::new(DECLARE_CALLBACK, l10n.text(Msg::DeclareNewIncident))
        .submit(l10n.text(Msg::DeclareIncident))
        .close(l10n.text(Msg::Cancel))
        .private_metadata(origin_channel)
        .block(Block::context(CONTEXT_BLOCK, Text::markdown(description)))
        .block(
            Block::input(
                INCIDENT_NAME_BLOCK,
                l10n.text(Msg::IncidentName),
                Element::text_input(INCIDENT_NAME_BLOCK)
                    .max_length(INCIDENT_NAME_MAX)
                    .on_character_entered(),
            )
            .with_hint(
                name_hint
                    .map(str::to_string)
                    .unwrap_or_else(|| l10n.text(Msg::IncidentNameHint)),
            )
            .dispatching(),
        )
        .block(
            Block::input(
                SECURITY_BLOCK,
                l10n.text(Msg::SecurityIncident),
                Element::Checkboxes {
                    action_id: SECURITY_BLOCK.into(),
                    options: vec![OptionObject::new(
                        l10n.text(Msg::SecurityIncidentLabel),
                        SECURITY_YES,
                    )],
                },
            )
            .optional(),
        )
        .block(Block::input(
            RESPONDER_BLOCK,
            l10n.text(Msg::Responder),
            Element::UsersSelect {
                action_id: RESPONDER_BLOCK.into(),
                placeholder: None,
            },
        ))
        .block(Block::input(
            COMMANDER_BLOCK,
            l10n.text(Msg::Commander),
            Element::UsersSelect {
                action_id: COMMANDER_BLOCK.into(),
                placeholder: None,
            },
        ));

    // Slack rejects choice elements without options, so unconfigured lists drop their block.
    for (block_id, label, values) in [
        (ENVIRONMENT_BLOCK, Msg::Environment, &options.environments),
        (REGION_BLOCK, Msg::Region, &options.regions),
    ] {
        if !values.is_empty() {
            modal = modal.block(Block::input(
                block_id,
                l10n.text(label),
                Element::Checkboxes {
                    action_id: block_id.into(),
                    options: values.iter().map(|v| plain_option(v)).collect(),
                },
            ));
        }
    }
    for (block_id, label, values) in [
        (SEVERITY_BLOCK, Msg::Severity, &options.severity_levels),
        (IMPACT_BLOCK, Msg::Impact, &options.impact_levels),
    ] {
        if !values.is_empty() {
            modal = modal.block(Block::input(
                block_id,
                l10n.text(label),
                Element::RadioButtons {
                    action_id: block_id.into(),
                    options: values.iter().map(|v| plain_option(v)).collect(),
                    initial_option: None,
                },
            ));
        }
    }

    modal
        .block(Block::input(
            SUMMARY_BLOCK,
            l10n.text(Msg::Summary),
            Element::text_input(SUMMARY_BLOCK).multiline(FREE_TEXT_MAX),
        ))
        .block(
            Block::input(
                INVITEES_BLOCK,
                l10n.text(Msg::Invitees),
                Element::MultiUsersSelect {
                    action_id: INVITEES_BLOCK.into(),
                    placeholder: None,
                },
            )
            .optional(),
        )
}

/// Builds the resolve modal; `channel_hint` replaces the default hint under the channel picker.
pub fn resolve_modal(
    l10n: &Localizer,
    options: &BotOptions,
    origin_channel: &str,
    channel_hint: Option<&str>,
) -> ModalView {
    let description = l10n.render(
        Msg::ResolveIncidentDescription,
        &json!({ "broadcastChannel": options.broadcast_channel_id }),
    );
    let no = OptionObject::new(l10n.text(Msg::No), ARCHIVE_NO);

    ModalView::new(RESOLVE_CALLBACK, l10n.text(Msg::ResolveAnIncident))
        .submit(l10n.text(Msg::ResolveIncident))
        .close(l10n.text(Msg::Cancel))
        .private_metadata(origin_channel)
        .block(Block::context(CONTEXT_BLOCK, Text::markdown(description)))
        .block(
            Block::input(
                INCIDENT_CHANNEL_BLOCK,
                l10n.text(Msg::Incident),
                Element::ConversationsSelect {
                    action_id: INCIDENT_CHANNEL_BLOCK.into(),
                    placeholder: None,
                    default_to_current_conversation: true,
                    initial_conversation: None,
                    filter: Some(ConversationFilter {
                        include: vec!["public".into(), "private".into()],
                        exclude_bot_users: true,
                    }),
                },
            )
            .with_hint(
                channel_hint
                    .map(str::to_string)
                    .unwrap_or_else(|| l10n.text(Msg::IncidentChannelNamePattern)),
            )
            .dispatching(),
        )
        .block(Block::input(
            ARCHIVE_BLOCK,
            l10n.text(Msg::ArchiveIncidentChannel),
            Element::RadioButtons {
                action_id: ARCHIVE_BLOCK.into(),
                options: vec![
                    OptionObject::new(l10n.text(Msg::Yes), ARCHIVE_YES),
                    no.clone(),
                ],
                initial_option: Some(no),
            },
        ))
        .block(Block::input(
            RESOLUTION_BLOCK,
            l10n.text(Msg::Resolution),
            Element::text_input(RESOLUTION_BLOCK).multiline(FREE_TEXT_MAX),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::Catalogs;

    fn options() -> BotOptions {
        BotOptions {
            broadcast_channel_id: "CBROAD".into(),
            environments: vec!["prod".into(), "staging".into()],
            regions: vec!["eu-west-1".into()],
            ..BotOptions::default()
        }
    }

    fn ids(modal: &ModalView) -> Vec<&str> {
        modal.blocks.iter().filter_map(Block::block_id).collect()
    }

    #[test]
    fn declare_modal_has_expected_blocks() {
        let en = Catalogs::embedded().unwrap().default_localizer();
        let modal = declare_modal(&en, &options(), "C42", None);
        assert_eq!(modal.callback_id, DECLARE_CALLBACK);
        assert_eq!(modal.private_metadata, "C42");
        assert_eq!(
            ids(&modal),
            vec![
                CONTEXT_BLOCK,
                INCIDENT_NAME_BLOCK,
                SECURITY_BLOCK,
                RESPONDER_BLOCK,
                COMMANDER_BLOCK,
                ENVIRONMENT_BLOCK,
                REGION_BLOCK,
                SUMMARY_BLOCK,
                INVITEES_BLOCK,
            ]
        );
        assert_eq!(
            modal.find_block(INCIDENT_NAME_BLOCK).and_then(Block::hint),
            Some(en.text(Msg::IncidentNameHint).as_str())
        );
    }

    #[test]
    fn severity_and_impact_appear_when_configured() {
        let en = Catalogs::embedded().unwrap().default_localizer();
        let opts = BotOptions {
            severity_levels: vec!["SEV1".into(), "SEV2".into()],
            impact_levels: vec!["high".into()],
            environments: Vec::new(),
            ..options()
        };
        let modal = declare_modal(&en, &opts, "C42", None);
        let blocks = ids(&modal);
        assert!(blocks.contains(&SEVERITY_BLOCK));
        assert!(blocks.contains(&IMPACT_BLOCK));
        assert!(!blocks.contains(&ENVIRONMENT_BLOCK));

        let json = serde_json::to_value(&modal).unwrap();
        let severity = json["blocks"]
            .as_array()
            .unwrap()
            .iter()
            .find(|b| b["block_id"] == SEVERITY_BLOCK)
            .unwrap();
        assert_eq!(severity["element"]["type"], "radio_buttons");
        assert_eq!(severity["element"]["options"][1]["value"], "SEV2");
    }

    #[test]
    fn hint_override_replaces_default() {
        let en = Catalogs::embedded().unwrap().default_localizer();
        let modal = declare_modal(&en, &options(), "", Some("bad name"));
        assert_eq!(
            modal.find_block(INCIDENT_NAME_BLOCK).and_then(Block::hint),
            Some("bad name")
        );
        let modal = resolve_modal(&en, &options(), "", Some("#general is wrong"));
        assert_eq!(
            modal.find_block(INCIDENT_CHANNEL_BLOCK).and_then(Block::hint),
            Some("#general is wrong")
        );
    }

    #[test]
    fn resolve_modal_defaults_to_current_conversation() {
        let en = Catalogs::embedded().unwrap().default_localizer();
        let modal = resolve_modal(&en, &options(), "C42", None);
        assert_eq!(modal.callback_id, RESOLVE_CALLBACK);
        let json = serde_json::to_value(&modal).unwrap();
        let picker = &json["blocks"][1];
        assert_eq!(picker["block_id"], INCIDENT_CHANNEL_BLOCK);
        assert_eq!(picker["dispatch_action"], true);
        assert_eq!(picker["element"]["default_to_current_conversation"], true);
        assert_eq!(picker["hint"]["text"], "Choose a channel that starts with 'inc_'");
        assert_eq!(json["blocks"][2]["element"]["initial_option"]["value"], ARCHIVE_NO);
        assert!(json["blocks"][0]["elements"][0]["text"]
            .as_str()
            .unwrap()
            .contains("<#CBROAD>"));
    }

    #[test]
    fn titles_fit_slack_limits_in_every_language() {
        let catalogs = Catalogs::embedded().unwrap();
        for lang in catalogs.languages() {
            let l10n = catalogs.localizer(lang);
            for modal in [
                declare_modal(&l10n, &options(), "", None),
                resolve_modal(&l10n, &options(), "", None),
            ] {
                for text in [Some(&modal.title), modal.submit.as_ref(), modal.close.as_ref()]
                    .into_iter()
                    .flatten()
                {
                    assert!(text.as_str().chars().count() <= 24, "{lang}: {text:?}");
                }
            }
        }
    }
}

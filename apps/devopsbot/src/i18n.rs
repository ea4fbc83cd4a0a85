//! Message catalogs and per-user localization.
//!
//! Catalogs are flat JSON maps of message id to a handlebars template, embedded at build time.
//! Lookups try the user's language, then English, then fall back to the bare message id.

use std::{collections::BTreeMap, sync::Arc};

use handlebars::Handlebars;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_LANGUAGE: &str = "en";

const EMBEDDED: &[(&str, &str)] = &[
    ("en", include_str!("../locales/en.json")),
    ("fr", include_str!("../locales/fr.json")),
];

#[derive(Debug, Error)]
pub enum I18nError {
    #[error("catalog {language} is not a JSON object of strings: {source}")]
    Catalog {
        language: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("message {id} in catalog {language} is not a valid template: {source}")]
    Template {
        language: String,
        id: String,
        #[source]
        source: Box<handlebars::TemplateError>,
    },
}

/// Every message the bot renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Msg {
    HelpMessage,
    DeclareNewIncident,
    Cancel,
    DeclareIncident,
    IncidentCreationDescription,
    IncidentName,
    IncidentNameHint,
    SecurityIncident,
    SecurityIncidentLabel,
    Responder,
    Commander,
    Environment,
    Region,
    Severity,
    Impact,
    Summary,
    Invitees,
    ResolveAnIncident,
    ResolveIncident,
    ResolveIncidentDescription,
    Incident,
    IncidentChannelNamePattern,
    ArchiveIncidentChannel,
    Yes,
    No,
    Resolution,
    IncidentChannelNameInvalid,
    ChosenChannelNotIncident,
    ChannelNameTaken,
    ChannelCreateFailed,
    IncidentChannelNamePreview,
    SecurityIncidentNotice,
    IncidentOverview,
    IncidentAnnouncement,
    StartCall,
    StartIncidentDoc,
    ProgressReminder,
    IncidentResolved,
    StartedDeclaring,
    FinishedDeclaring,
    StartedResolving,
    FinishedResolving,
    FailedJoinBroadcast,
    FailedSetPurpose,
    FailedSetTopic,
    FailedInvite,
    FailedAnnounce,
    FailedStartCall,
    FailedIncidentDoc,
    FailedReminder,
    FailedAnnounceResolution,
    FailedArchive,
    ArchiveNotPermitted,
    OpenIncidents,
    NoOpenIncidents,
}

impl Msg {
    pub const ALL: &'static [Msg] = &[
        Msg::HelpMessage,
        Msg::DeclareNewIncident,
        Msg::Cancel,
        Msg::DeclareIncident,
        Msg::IncidentCreationDescription,
        Msg::IncidentName,
        Msg::IncidentNameHint,
        Msg::SecurityIncident,
        Msg::SecurityIncidentLabel,
        Msg::Responder,
        Msg::Commander,
        Msg::Environment,
        Msg::Region,
        Msg::Severity,
        Msg::Impact,
        Msg::Summary,
        Msg::Invitees,
        Msg::ResolveAnIncident,
        Msg::ResolveIncident,
        Msg::ResolveIncidentDescription,
        Msg::Incident,
        Msg::IncidentChannelNamePattern,
        Msg::ArchiveIncidentChannel,
        Msg::Yes,
        Msg::No,
        Msg::Resolution,
        Msg::IncidentChannelNameInvalid,
        Msg::ChosenChannelNotIncident,
        Msg::ChannelNameTaken,
        Msg::ChannelCreateFailed,
        Msg::IncidentChannelNamePreview,
        Msg::SecurityIncidentNotice,
        Msg::IncidentOverview,
        Msg::IncidentAnnouncement,
        Msg::StartCall,
        Msg::StartIncidentDoc,
        Msg::ProgressReminder,
        Msg::IncidentResolved,
        Msg::StartedDeclaring,
        Msg::FinishedDeclaring,
        Msg::StartedResolving,
        Msg::FinishedResolving,
        Msg::FailedJoinBroadcast,
        Msg::FailedSetPurpose,
        Msg::FailedSetTopic,
        Msg::FailedInvite,
        Msg::FailedAnnounce,
        Msg::FailedStartCall,
        Msg::FailedIncidentDoc,
        Msg::FailedReminder,
        Msg::FailedAnnounceResolution,
        Msg::FailedArchive,
        Msg::ArchiveNotPermitted,
        Msg::OpenIncidents,
        Msg::NoOpenIncidents,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Msg::HelpMessage => "HelpMessage",
            Msg::DeclareNewIncident => "DeclareNewIncident",
            Msg::Cancel => "Cancel",
            Msg::DeclareIncident => "DeclareIncident",
            Msg::IncidentCreationDescription => "IncidentCreationDescription",
            Msg::IncidentName => "IncidentName",
            Msg::IncidentNameHint => "IncidentNameHint",
            Msg::SecurityIncident => "SecurityIncident",
            Msg::SecurityIncidentLabel => "SecurityIncidentLabel",
            Msg::Responder => "Responder",
            Msg::Commander => "Commander",
            Msg::Environment => "Environment",
            Msg::Region => "Region",
            Msg::Severity => "Severity",
            Msg::Impact => "Impact",
            Msg::Summary => "Summary",
            Msg::Invitees => "Invitees",
            Msg::ResolveAnIncident => "ResolveAnIncident",
            Msg::ResolveIncident => "ResolveIncident",
            Msg::ResolveIncidentDescription => "ResolveIncidentDescription",
            Msg::Incident => "Incident",
            Msg::IncidentChannelNamePattern => "IncidentChannelNamePattern",
            Msg::ArchiveIncidentChannel => "ArchiveIncidentChannel",
            Msg::Yes => "Yes",
            Msg::No => "No",
            Msg::Resolution => "Resolution",
            Msg::IncidentChannelNameInvalid => "IncidentChannelNameInvalid",
            Msg::ChosenChannelNotIncident => "ChosenChannelNotIncident",
            Msg::ChannelNameTaken => "ChannelNameTaken",
            Msg::ChannelCreateFailed => "ChannelCreateFailed",
            Msg::IncidentChannelNamePreview => "IncidentChannelNamePreview",
            Msg::SecurityIncidentNotice => "SecurityIncidentNotice",
            Msg::IncidentOverview => "IncidentOverview",
            Msg::IncidentAnnouncement => "IncidentAnnouncement",
            Msg::StartCall => "StartCall",
            Msg::StartIncidentDoc => "StartIncidentDoc",
            Msg::ProgressReminder => "ProgressReminder",
            Msg::IncidentResolved => "IncidentResolved",
            Msg::StartedDeclaring => "StartedDeclaring",
            Msg::FinishedDeclaring => "FinishedDeclaring",
            Msg::StartedResolving => "StartedResolving",
            Msg::FinishedResolving => "FinishedResolving",
            Msg::FailedJoinBroadcast => "FailedJoinBroadcast",
            Msg::FailedSetPurpose => "FailedSetPurpose",
            Msg::FailedSetTopic => "FailedSetTopic",
            Msg::FailedInvite => "FailedInvite",
            Msg::FailedAnnounce => "FailedAnnounce",
            Msg::FailedStartCall => "FailedStartCall",
            Msg::FailedIncidentDoc => "FailedIncidentDoc",
            Msg::FailedReminder => "FailedReminder",
            Msg::FailedAnnounceResolution => "FailedAnnounceResolution",
            Msg::FailedArchive => "FailedArchive",
            Msg::ArchiveNotPermitted => "ArchiveNotPermitted",
            Msg::OpenIncidents => "OpenIncidents",
            Msg::NoOpenIncidents => "NoOpenIncidents",
        }
    }
}

/// All loaded catalogs, compiled into one handlebars registry keyed `"{language}.{id}"`.
pub struct Catalogs {
    registry: Handlebars<'static>,
    languages: Vec<String>,
}

impl std::fmt::Debug for Catalogs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalogs")
            .field("languages", &self.languages)
            .finish()
    }
}

impl Catalogs {
    /// The catalogs shipped with the binary.
    pub fn embedded() -> Result<Arc<Self>, I18nError> {
        Self::from_sources(EMBEDDED.iter().copied()).map(Arc::new)
    }

    pub fn from_sources<'a>(
        sources: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, I18nError> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        let mut languages = Vec::new();

        for (language, raw) in sources {
            let messages: BTreeMap<String, String> =
                serde_json::from_str(raw).map_err(|source| I18nError::Catalog {
                    language: language.to_string(),
                    source,
                })?;
            for (id, template) in messages {
                registry
                    .register_template_string(&key(language, &id), template)
                    .map_err(|source| I18nError::Template {
                        language: language.to_string(),
                        id: id.clone(),
                        source: Box::new(source),
                    })?;
            }
            languages.push(language.to_string());
        }

        Ok(Self {
            registry,
            languages,
        })
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    /// A localizer for an IETF tag such as `fr-FR`. Unknown languages get English.
    pub fn localizer(self: &Arc<Self>, locale: &str) -> Localizer {
        let requested = locale
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        let language = if self.languages.iter().any(|l| *l == requested) {
            requested
        } else {
            DEFAULT_LANGUAGE.to_string()
        };
        Localizer {
            catalogs: Arc::clone(self),
            language,
        }
    }

    pub fn default_localizer(self: &Arc<Self>) -> Localizer {
        self.localizer(DEFAULT_LANGUAGE)
    }
}

fn key(language: &str, id: &str) -> String {
    format!("{language}.{id}")
}

/// Renders messages for one language, falling back to English and then to the message id.
///
/// Stored in the request [`devopsbot_core::Context`] so background work keeps the user's language.
#[derive(Clone)]
pub struct Localizer {
    catalogs: Arc<Catalogs>,
    language: String,
}

impl std::fmt::Debug for Localizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Localizer")
            .field("language", &self.language)
            .finish()
    }
}

impl Localizer {
    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn text(&self, msg: Msg) -> String {
        self.render(msg, &json!({}))
    }

    pub fn render<T: Serialize>(&self, msg: Msg, data: &T) -> String {
        let registry = &self.catalogs.registry;
        let name = [&self.language[..], DEFAULT_LANGUAGE]
            .iter()
            .map(|language| key(language, msg.id()))
            .find(|name| registry.has_template(name));
        let Some(name) = name else {
            warn!(message_id = msg.id(), language = %self.language, "missing message");
            return msg.id().to_string();
        };
        match registry.render(&name, data) {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, message_id = msg.id(), "failed to render message");
                msg.id().to_string()
            }
        }
    }

    /// Shorthand for templates with a single `{{name}}` placeholder.
    pub fn with_name(&self, msg: Msg, name: &str) -> String {
        self.render(msg, &json!({ "name": name }))
    }

    /// Shorthand for failure notices rendering `{{error}}`.
    pub fn with_error(&self, msg: Msg, error: &dyn std::fmt::Display) -> String {
        self.render(msg, &json!({ "error": error.to_string() }))
    }
}

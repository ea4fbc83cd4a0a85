//! Field validation for the incident modals.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use time::{OffsetDateTime, macros::format_description};

use crate::i18n::{Localizer, Msg};

pub const INCIDENT_PREFIX: &str = "inc_";

static CHANNEL_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_-]+$").expect("valid channel name regex"));
static INCIDENT_CHANNEL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^inc_").expect("valid incident channel regex"));

/// Per-field error messages keyed by block id, as Slack expects in a `response_action: errors`
/// reply.
pub type FieldErrors = BTreeMap<String, String>;

/// `inc_<input>_<mon>_<day>` with the date lowercased, e.g. `inc_db-down_oct_3`.
pub fn incident_channel_name(input: &str, date: OffsetDateTime) -> String {
    let suffix = date
        .format(format_description!("[month repr:short]_[day padding:none]"))
        .unwrap_or_default()
        .to_lowercase();
    format!("{INCIDENT_PREFIX}{input}_{suffix}")
}

pub fn is_valid_channel_name(name: &str) -> bool {
    CHANNEL_NAME_REGEX.is_match(name)
}

pub fn is_incident_channel(name: &str) -> bool {
    INCIDENT_CHANNEL_REGEX.is_match(name)
}

/// Checks a channel name against Slack's `conversations.create` rules.
pub fn validate_incident_channel_name(
    localizer: &Localizer,
    field: &str,
    name: &str,
) -> Result<(), FieldErrors> {
    if is_valid_channel_name(name) {
        return Ok(());
    }
    Err(single(
        field,
        localizer.with_name(Msg::IncidentChannelNameInvalid, name),
    ))
}

/// Checks that a channel picked for resolution is an incident channel.
pub fn validate_chosen_incident_channel_name(
    localizer: &Localizer,
    field: &str,
    name: &str,
) -> Result<(), FieldErrors> {
    if is_incident_channel(name) {
        return Ok(());
    }
    Err(single(
        field,
        localizer.with_name(Msg::ChosenChannelNotIncident, name),
    ))
}

pub fn single(field: &str, message: String) -> FieldErrors {
    FieldErrors::from([(field.to_string(), message)])
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::i18n::Catalogs;

    fn en() -> Localizer {
        Catalogs::embedded().unwrap().default_localizer()
    }

    #[test]
    fn channel_names_follow_slack_rules() {
        for ok in ["inc_db-down_oct_3", "a", "inc_1_2", "under_score-hyphen"] {
            assert!(is_valid_channel_name(ok), "{ok}");
        }
        for bad in ["", "Inc_upper", "with space", "what?", "a/b", "star*", "émoji"] {
            assert!(!is_valid_channel_name(bad), "{bad}");
        }
    }

    #[test]
    fn chosen_channel_must_have_incident_prefix() {
        assert!(is_incident_channel("inc_db_oct_3"));
        assert!(is_incident_channel("inc_"));
        assert!(!is_incident_channel("general"));
        assert!(!is_incident_channel("xinc_db"));
        assert!(!is_incident_channel("INC_db"));
    }

    #[test]
    fn channel_name_gets_lowercased_date_suffix() {
        let date = datetime!(2024-10-03 23:59 UTC);
        assert_eq!(incident_channel_name("db-down", date), "inc_db-down_oct_3");
        let date = datetime!(2024-12-25 00:00 UTC);
        assert_eq!(incident_channel_name("x", date), "inc_x_dec_25");
    }

    #[test]
    fn derived_names_with_uppercase_or_spaces_are_rejected() {
        let date = datetime!(2024-10-03 12:00 UTC);
        let name = incident_channel_name("DB down", date);
        let errors = validate_incident_channel_name(&en(), "incident_name", &name).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors["incident_name"],
            "inc_DB down_oct_3 - channel name must be non-empty, and contain only lowercase letters, numbers, hyphens, and underscores"
        );
    }

    #[test]
    fn chosen_channel_errors_are_keyed_to_the_field() {
        let errors =
            validate_chosen_incident_channel_name(&en(), "incident_channel", "general").unwrap_err();
        assert_eq!(
            errors["incident_channel"],
            "#general does not seem to be an incident channel"
        );
        assert!(validate_chosen_incident_channel_name(&en(), "incident_channel", "inc_a").is_ok());
    }

    #[test]
    fn errors_are_localized() {
        let fr = Catalogs::embedded().unwrap().localizer("fr-FR");
        let errors = validate_chosen_incident_channel_name(&fr, "incident_channel", "general")
            .unwrap_err();
        assert_eq!(
            errors["incident_channel"],
            "#general ne semble pas être un canal d'incident"
        );
    }
}

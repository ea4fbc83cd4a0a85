//! Inbound Slack payloads and Web API response shapes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::blocks::{OptionObject, Text};

/// A slash command invocation (`application/x-www-form-urlencoded`).
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct SlashCommand {
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub team_domain: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub channel_name: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub response_url: String,
    #[serde(default)]
    pub trigger_id: String,
    #[serde(default)]
    pub api_app_id: String,
}

impl SlashCommand {
    /// First whitespace-delimited word of the command text.
    pub fn action(&self) -> &str {
        self.text.split_whitespace().next().unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    BlockActions,
    ViewSubmission,
    ViewClosed,
    Shortcut,
    MessageAction,
    #[serde(other)]
    Unknown,
}

/// The JSON document carried in the `payload` form field of an interaction request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InteractionCallback {
    #[serde(rename = "type")]
    pub kind: InteractionType,
    #[serde(default)]
    pub trigger_id: String,
    #[serde(default)]
    pub user: UserRef,
    #[serde(default)]
    pub channel: Option<ChannelRef>,
    #[serde(default)]
    pub view: View,
    #[serde(default)]
    pub actions: Vec<BlockAction>,
    #[serde(default)]
    pub response_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct UserRef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ChannelRef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// A modal as Slack reports it back (in interactions and `views.*` responses).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct View {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub callback_id: String,
    #[serde(default)]
    pub private_metadata: String,
    #[serde(default)]
    pub state: ViewState,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ViewState {
    /// block id -> action id -> value
    #[serde(default)]
    pub values: HashMap<String, HashMap<String, ActionValue>>,
}

impl ViewState {
    /// The value of the first action inside `block_id`. devopsbot modals carry one element per
    /// input block.
    pub fn block(&self, block_id: &str) -> Option<&ActionValue> {
        self.values
            .get(block_id)
            .and_then(|actions| actions.values().next())
    }
}

/// The user-entered state of one interactive element.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ActionValue {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub selected_option: Option<OptionObject>,
    #[serde(default)]
    pub selected_options: Vec<OptionObject>,
    #[serde(default)]
    pub selected_user: Option<String>,
    #[serde(default)]
    pub selected_users: Vec<String>,
    #[serde(default)]
    pub selected_conversation: Option<String>,
    #[serde(default)]
    pub selected_channel: Option<String>,
}

impl ActionValue {
    pub fn text(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }

    pub fn selected_value(&self) -> Option<&str> {
        self.selected_option.as_ref().map(|opt| opt.value.as_str())
    }

    pub fn selected_values(&self) -> Vec<String> {
        self.selected_options
            .iter()
            .map(|opt| opt.value.clone())
            .collect()
    }

    pub fn conversation(&self) -> Option<&str> {
        self.selected_conversation
            .as_deref()
            .or(self.selected_channel.as_deref())
    }
}

/// An element interaction inside a modal (`block_actions`).
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct BlockAction {
    #[serde(default)]
    pub block_id: String,
    #[serde(default)]
    pub action_id: String,
    #[serde(flatten)]
    pub state: ActionValue,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub is_member: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub real_name: Option<String>,
    /// IETF tag such as `en-US`; only present when requested with `include_locale`.
    #[serde(default)]
    pub locale: Option<String>,
}

/// `auth.test` response.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct AuthIdentity {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub bot_id: Option<String>,
}

/// One page of `users.conversations`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationPage {
    pub channels: Vec<Channel>,
    pub next_cursor: Option<String>,
}

/// Where an outgoing message lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Channel(String),
    Ephemeral { channel: String, user: String },
    ResponseUrl(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub destination: Destination,
    pub text: String,
}

impl OutgoingMessage {
    pub fn channel(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            destination: Destination::Channel(channel.into()),
            text: text.into(),
        }
    }

    pub fn ephemeral(
        channel: impl Into<String>,
        user: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            destination: Destination::Ephemeral {
                channel: channel.into(),
                user: user.into(),
            },
            text: text.into(),
        }
    }

    pub fn response_url(url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            destination: Destination::ResponseUrl(url.into()),
            text: text.into(),
        }
    }
}

/// Text of an option, convenient for building radio/checkbox choices from plain strings.
pub fn plain_option(value: &str) -> OptionObject {
    OptionObject {
        text: Text::plain(value),
        value: value.to_string(),
    }
}

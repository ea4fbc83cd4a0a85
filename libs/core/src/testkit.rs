//! In-memory [`SlackClient`] for tests: records every call and answers from a small script.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::slack::{
    AuthIdentity, Channel, ConversationPage, OutgoingMessage, SlackClient, SlackError, User, View,
    blocks::ModalView,
};

#[derive(Debug, Clone, PartialEq)]
pub enum SlackCall {
    SendMessage(OutgoingMessage),
    UserGroupMembers(String),
    OpenView {
        trigger_id: String,
        view: Value,
    },
    UpdateView {
        view_id: String,
        hash: Option<String>,
        view: Value,
    },
    CreateConversation {
        name: String,
        is_private: bool,
    },
    ConversationInfo(String),
    ArchiveConversation(String),
    SetPurpose {
        channel: String,
        purpose: String,
    },
    SetTopic {
        channel: String,
        topic: String,
    },
    InviteUsers {
        channel: String,
        users: Vec<String>,
    },
    AddChannelReminder {
        channel: String,
        text: String,
        time: String,
    },
    UserInfo(String),
    AuthTest,
    ConversationsForUser(Option<String>),
}

impl SlackCall {
    /// The Slack Web API method this call maps to.
    pub fn method(&self) -> &'static str {
        match self {
            Self::SendMessage(msg) => match msg.destination {
                crate::slack::Destination::Channel(_) => "chat.postMessage",
                crate::slack::Destination::Ephemeral { .. } => "chat.postEphemeral",
                crate::slack::Destination::ResponseUrl(_) => "response_url",
            },
            Self::UserGroupMembers(_) => "usergroups.users.list",
            Self::OpenView { .. } => "views.open",
            Self::UpdateView { .. } => "views.update",
            Self::CreateConversation { .. } => "conversations.create",
            Self::ConversationInfo(_) => "conversations.info",
            Self::ArchiveConversation(_) => "conversations.archive",
            Self::SetPurpose { .. } => "conversations.setPurpose",
            Self::SetTopic { .. } => "conversations.setTopic",
            Self::InviteUsers { .. } => "conversations.invite",
            Self::AddChannelReminder { .. } => "reminders.add",
            Self::UserInfo(_) => "users.info",
            Self::AuthTest => "auth.test",
            Self::ConversationsForUser(_) => "users.conversations",
        }
    }
}

#[derive(Default)]
struct Script {
    failures: HashMap<String, String>,
    users: HashMap<String, User>,
    channels: BTreeMap<String, Channel>,
    groups: HashMap<String, Vec<String>>,
    identity: AuthIdentity,
    created: usize,
}

/// Scripted Slack workspace.
///
/// Unknown users resolve to an `en-US` profile; unknown channels answer `channel_not_found`.
/// Any method can be forced to fail with a Slack error code through [`RecordingSlackClient::fail`].
#[derive(Default)]
pub struct RecordingSlackClient {
    calls: Mutex<Vec<SlackCall>>,
    script: Mutex<Script>,
}

impl RecordingSlackClient {
    pub fn new() -> Self {
        let client = Self::default();
        client.lock_script().identity = AuthIdentity {
            user_id: "UBOT".into(),
            user: "devopsbot".into(),
            team_id: "T1".into(),
            bot_id: Some("BBOT".into()),
        };
        client
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_user(self, id: &str, locale: &str) -> Self {
        self.lock_script().users.insert(
            id.to_string(),
            User {
                id: id.to_string(),
                name: id.to_lowercase(),
                real_name: None,
                locale: Some(locale.to_string()),
            },
        );
        self
    }

    pub fn with_channel(self, id: &str, name: &str) -> Self {
        self.lock_script().channels.insert(
            id.to_string(),
            Channel {
                id: id.to_string(),
                name: name.to_string(),
                is_member: true,
                ..Channel::default()
            },
        );
        self
    }

    pub fn with_group(self, group_id: &str, members: &[&str]) -> Self {
        self.lock_script().groups.insert(
            group_id.to_string(),
            members.iter().map(|m| m.to_string()).collect(),
        );
        self
    }

    /// Makes every call to `method` fail with `code` until [`Self::recover`] is called.
    pub fn fail(&self, method: &str, code: &str) {
        self.lock_script()
            .failures
            .insert(method.to_string(), code.to_string());
    }

    pub fn recover(&self, method: &str) {
        self.lock_script().failures.remove(method);
    }

    pub fn calls(&self) -> Vec<SlackCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn calls_to(&self, method: &str) -> Vec<SlackCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.method() == method)
            .collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls_to(method).len()
    }

    /// Every message sent, in order, regardless of destination.
    pub fn messages(&self) -> Vec<OutgoingMessage> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SlackCall::SendMessage(msg) => Some(msg),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: SlackCall) -> Result<(), SlackError> {
        let method = call.method();
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
        match self.lock_script().failures.get(method) {
            Some(code) => Err(SlackError::api(method, code.clone())),
            None => Ok(()),
        }
    }
}

fn to_value(view: &ModalView) -> Value {
    serde_json::to_value(view).unwrap_or(Value::Null)
}

#[async_trait]
impl SlackClient for RecordingSlackClient {
    async fn send_message(&self, message: OutgoingMessage) -> Result<(), SlackError> {
        self.record(SlackCall::SendMessage(message))
    }

    async fn user_group_members(&self, group_id: &str) -> Result<Vec<String>, SlackError> {
        self.record(SlackCall::UserGroupMembers(group_id.to_string()))?;
        Ok(self
            .lock_script()
            .groups
            .get(group_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn open_view(&self, trigger_id: &str, view: &ModalView) -> Result<View, SlackError> {
        self.record(SlackCall::OpenView {
            trigger_id: trigger_id.to_string(),
            view: to_value(view),
        })?;
        Ok(View {
            id: "V1".into(),
            hash: "hash-1".into(),
            callback_id: view.callback_id.clone(),
            private_metadata: view.private_metadata.clone(),
            ..View::default()
        })
    }

    async fn update_view(
        &self,
        view_id: &str,
        hash: Option<&str>,
        view: &ModalView,
    ) -> Result<View, SlackError> {
        self.record(SlackCall::UpdateView {
            view_id: view_id.to_string(),
            hash: hash.map(str::to_string),
            view: to_value(view),
        })?;
        Ok(View {
            id: view_id.to_string(),
            callback_id: view.callback_id.clone(),
            ..View::default()
        })
    }

    async fn create_conversation(
        &self,
        name: &str,
        is_private: bool,
    ) -> Result<Channel, SlackError> {
        self.record(SlackCall::CreateConversation {
            name: name.to_string(),
            is_private,
        })?;
        let mut script = self.lock_script();
        if script.channels.values().any(|c| c.name == name) {
            return Err(SlackError::api("conversations.create", "name_taken"));
        }
        script.created += 1;
        let channel = Channel {
            id: format!("CINC{}", script.created),
            name: name.to_string(),
            is_private,
            is_member: true,
            ..Channel::default()
        };
        script.channels.insert(channel.id.clone(), channel.clone());
        Ok(channel)
    }

    async fn conversation_info(&self, channel_id: &str) -> Result<Channel, SlackError> {
        self.record(SlackCall::ConversationInfo(channel_id.to_string()))?;
        self.lock_script()
            .channels
            .get(channel_id)
            .cloned()
            .ok_or_else(|| SlackError::api("conversations.info", "channel_not_found"))
    }

    async fn archive_conversation(&self, channel_id: &str) -> Result<(), SlackError> {
        self.record(SlackCall::ArchiveConversation(channel_id.to_string()))?;
        if let Some(channel) = self.lock_script().channels.get_mut(channel_id) {
            channel.is_archived = true;
        }
        Ok(())
    }

    async fn set_purpose(&self, channel_id: &str, purpose: &str) -> Result<(), SlackError> {
        self.record(SlackCall::SetPurpose {
            channel: channel_id.to_string(),
            purpose: purpose.to_string(),
        })
    }

    async fn set_topic(&self, channel_id: &str, topic: &str) -> Result<(), SlackError> {
        self.record(SlackCall::SetTopic {
            channel: channel_id.to_string(),
            topic: topic.to_string(),
        })
    }

    async fn invite_users(&self, channel_id: &str, users: &[String]) -> Result<(), SlackError> {
        self.record(SlackCall::InviteUsers {
            channel: channel_id.to_string(),
            users: users.to_vec(),
        })
    }

    async fn add_channel_reminder(
        &self,
        channel_id: &str,
        text: &str,
        time: &str,
    ) -> Result<(), SlackError> {
        self.record(SlackCall::AddChannelReminder {
            channel: channel_id.to_string(),
            text: text.to_string(),
            time: time.to_string(),
        })
    }

    async fn user_info(&self, user_id: &str) -> Result<User, SlackError> {
        self.record(SlackCall::UserInfo(user_id.to_string()))?;
        Ok(self
            .lock_script()
            .users
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| User {
                id: user_id.to_string(),
                name: user_id.to_lowercase(),
                real_name: None,
                locale: Some("en-US".into()),
            }))
    }

    async fn auth_test(&self) -> Result<AuthIdentity, SlackError> {
        self.record(SlackCall::AuthTest)?;
        Ok(self.lock_script().identity.clone())
    }

    async fn conversations_for_user(
        &self,
        cursor: Option<&str>,
    ) -> Result<ConversationPage, SlackError> {
        self.record(SlackCall::ConversationsForUser(cursor.map(str::to_string)))?;
        let channels = self
            .lock_script()
            .channels
            .values()
            .filter(|c| c.is_member && !c.is_archived)
            .cloned()
            .collect();
        Ok(ConversationPage {
            channels,
            next_cursor: None,
        })
    }
}

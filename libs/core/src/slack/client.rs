use async_trait::async_trait;

use super::{
    blocks::ModalView,
    error::SlackError,
    types::{AuthIdentity, Channel, ConversationPage, OutgoingMessage, User, View},
};

/// The Slack Web API operations devopsbot relies on.
///
/// Every method maps onto one API call and is never retried.
#[async_trait]
pub trait SlackClient: Send + Sync {
    /// `chat.postMessage`, `chat.postEphemeral`, or a POST to a response URL.
    async fn send_message(&self, message: OutgoingMessage) -> Result<(), SlackError>;

    /// `usergroups.users.list`
    async fn user_group_members(&self, group_id: &str) -> Result<Vec<String>, SlackError>;

    /// `views.open`
    async fn open_view(&self, trigger_id: &str, view: &ModalView) -> Result<View, SlackError>;

    /// `views.update`, guarded by the view `hash` when one is known.
    async fn update_view(
        &self,
        view_id: &str,
        hash: Option<&str>,
        view: &ModalView,
    ) -> Result<View, SlackError>;

    /// `conversations.create`
    async fn create_conversation(&self, name: &str, is_private: bool)
    -> Result<Channel, SlackError>;

    /// `conversations.info`
    async fn conversation_info(&self, channel_id: &str) -> Result<Channel, SlackError>;

    /// `conversations.archive`
    async fn archive_conversation(&self, channel_id: &str) -> Result<(), SlackError>;

    /// `conversations.setPurpose`
    async fn set_purpose(&self, channel_id: &str, purpose: &str) -> Result<(), SlackError>;

    /// `conversations.setTopic`
    async fn set_topic(&self, channel_id: &str, topic: &str) -> Result<(), SlackError>;

    /// `conversations.invite`
    async fn invite_users(&self, channel_id: &str, users: &[String]) -> Result<(), SlackError>;

    /// `reminders.add` targeting a channel; `time` uses Slack's natural language format
    /// (e.g. `Every 30 min`).
    async fn add_channel_reminder(
        &self,
        channel_id: &str,
        text: &str,
        time: &str,
    ) -> Result<(), SlackError>;

    /// `users.info` with `include_locale`.
    async fn user_info(&self, user_id: &str) -> Result<User, SlackError>;

    /// `auth.test`
    async fn auth_test(&self) -> Result<AuthIdentity, SlackError>;

    /// One page of `users.conversations` for the bot user.
    async fn conversations_for_user(
        &self,
        cursor: Option<&str>,
    ) -> Result<ConversationPage, SlackError>;
}

/// Collects every page of [`SlackClient::conversations_for_user`].
pub async fn all_conversations_for_user(
    client: &dyn SlackClient,
) -> Result<Vec<Channel>, SlackError> {
    let mut channels = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = client.conversations_for_user(cursor.as_deref()).await?;
        channels.extend(page.channels);
        match page.next_cursor.filter(|next| !next.is_empty()) {
            Some(next) => cursor = Some(next),
            None => return Ok(channels),
        }
    }
}

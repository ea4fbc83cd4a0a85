use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{
    blocks::ModalView,
    client::SlackClient,
    error::SlackError,
    types::{AuthIdentity, Channel, ConversationPage, Destination, OutgoingMessage, User, View},
};

pub const DEFAULT_API_BASE: &str = "https://slack.com/api";

/// [`SlackClient`] backed by the Slack Web API over `reqwest`.
#[derive(Clone)]
pub struct SlackWebClient {
    http: reqwest::Client,
    token: String,
    api_base: String,
}

impl std::fmt::Debug for SlackWebClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackWebClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct ChannelEnvelope {
    channel: Channel,
}

#[derive(Deserialize)]
struct UserEnvelope {
    user: User,
}

#[derive(Deserialize)]
struct ViewEnvelope {
    view: View,
}

#[derive(Deserialize)]
struct UsersEnvelope {
    #[serde(default)]
    users: Vec<String>,
}

#[derive(Deserialize, Default)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Deserialize)]
struct ChannelsEnvelope {
    #[serde(default)]
    channels: Vec<Channel>,
    #[serde(default)]
    response_metadata: ResponseMetadata,
}

impl SlackWebClient {
    pub fn new(http: reqwest::Client, token: impl Into<String>, api_base: Option<String>) -> Self {
        Self {
            http,
            token: token.into(),
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.into()),
        }
    }

    fn build_url(&self, method: &str) -> String {
        format!(
            "{}/{}",
            self.api_base.trim_end_matches('/'),
            method.trim_start_matches('/')
        )
    }

    /// POSTs a JSON body to a write method.
    async fn call_json<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &Value,
    ) -> Result<T, SlackError> {
        let request = self
            .http
            .post(self.build_url(method))
            .bearer_auth(&self.token)
            .json(body);
        self.execute(method, request).await
    }

    /// POSTs form parameters; read methods do not accept JSON bodies.
    async fn call_form<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, &str)],
    ) -> Result<T, SlackError> {
        let request = self
            .http
            .post(self.build_url(method))
            .bearer_auth(&self.token)
            .form(params);
        self.execute(method, request).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: &str,
        request: RequestBuilder,
    ) -> Result<T, SlackError> {
        let response = request.send().await.map_err(|source| SlackError::Transport {
            method: method.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            return Err(SlackError::Status {
                method: method.to_string(),
                status: status.as_u16(),
                retry_after_secs,
            });
        }

        let body_text = response.text().await.map_err(|source| SlackError::Transport {
            method: method.to_string(),
            source,
        })?;
        let raw: Value = serde_json::from_str(&body_text).map_err(|source| SlackError::Decode {
            method: method.to_string(),
            source,
        })?;

        let ok = raw.get("ok").and_then(|v| v.as_bool()).unwrap_or(false);
        if !ok {
            let code = raw
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            debug!(method, code, "slack api call failed");
            return Err(SlackError::api(method, code));
        }

        serde_json::from_value(raw).map_err(|source| SlackError::Decode {
            method: method.to_string(),
            source,
        })
    }

    async fn post_response_url(&self, url: &str, text: &str) -> Result<(), SlackError> {
        const METHOD: &str = "response_url";
        let response = self
            .http
            .post(url)
            .json(&json!({"response_type": "ephemeral", "text": text}))
            .send()
            .await
            .map_err(|source| SlackError::Transport {
                method: METHOD.to_string(),
                source,
            })?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(SlackError::Status {
                method: METHOD.to_string(),
                status: status.as_u16(),
                retry_after_secs: None,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SlackClient for SlackWebClient {
    async fn send_message(&self, message: OutgoingMessage) -> Result<(), SlackError> {
        match &message.destination {
            Destination::Channel(channel) => {
                self.call_json::<Value>(
                    "chat.postMessage",
                    &json!({"channel": channel, "text": message.text}),
                )
                .await?;
            }
            Destination::Ephemeral { channel, user } => {
                self.call_json::<Value>(
                    "chat.postEphemeral",
                    &json!({"channel": channel, "user": user, "text": message.text}),
                )
                .await?;
            }
            Destination::ResponseUrl(url) => self.post_response_url(url, &message.text).await?,
        }
        Ok(())
    }

    async fn user_group_members(&self, group_id: &str) -> Result<Vec<String>, SlackError> {
        let envelope: UsersEnvelope = self
            .call_form("usergroups.users.list", &[("usergroup", group_id)])
            .await?;
        Ok(envelope.users)
    }

    async fn open_view(&self, trigger_id: &str, view: &ModalView) -> Result<View, SlackError> {
        let envelope: ViewEnvelope = self
            .call_json("views.open", &json!({"trigger_id": trigger_id, "view": view}))
            .await?;
        Ok(envelope.view)
    }

    async fn update_view(
        &self,
        view_id: &str,
        hash: Option<&str>,
        view: &ModalView,
    ) -> Result<View, SlackError> {
        let mut body = json!({"view_id": view_id, "view": view});
        if let Some(hash) = hash.filter(|h| !h.is_empty()) {
            body["hash"] = Value::String(hash.to_string());
        }
        let envelope: ViewEnvelope = self.call_json("views.update", &body).await?;
        Ok(envelope.view)
    }

    async fn create_conversation(
        &self,
        name: &str,
        is_private: bool,
    ) -> Result<Channel, SlackError> {
        let envelope: ChannelEnvelope = self
            .call_json(
                "conversations.create",
                &json!({"name": name, "is_private": is_private}),
            )
            .await?;
        Ok(envelope.channel)
    }

    async fn conversation_info(&self, channel_id: &str) -> Result<Channel, SlackError> {
        let envelope: ChannelEnvelope = self
            .call_form("conversations.info", &[("channel", channel_id)])
            .await?;
        Ok(envelope.channel)
    }

    async fn archive_conversation(&self, channel_id: &str) -> Result<(), SlackError> {
        self.call_json::<Value>("conversations.archive", &json!({"channel": channel_id}))
            .await?;
        Ok(())
    }

    async fn set_purpose(&self, channel_id: &str, purpose: &str) -> Result<(), SlackError> {
        self.call_json::<Value>(
            "conversations.setPurpose",
            &json!({"channel": channel_id, "purpose": purpose}),
        )
        .await?;
        Ok(())
    }

    async fn set_topic(&self, channel_id: &str, topic: &str) -> Result<(), SlackError> {
        self.call_json::<Value>(
            "conversations.setTopic",
            &json!({"channel": channel_id, "topic": topic}),
        )
        .await?;
        Ok(())
    }

    async fn invite_users(&self, channel_id: &str, users: &[String]) -> Result<(), SlackError> {
        self.call_json::<Value>(
            "conversations.invite",
            &json!({"channel": channel_id, "users": users.join(",")}),
        )
        .await?;
        Ok(())
    }

    async fn add_channel_reminder(
        &self,
        channel_id: &str,
        text: &str,
        time: &str,
    ) -> Result<(), SlackError> {
        self.call_form::<Value>(
            "reminders.add",
            &[("channel", channel_id), ("text", text), ("time", time)],
        )
        .await?;
        Ok(())
    }

    async fn user_info(&self, user_id: &str) -> Result<User, SlackError> {
        let envelope: UserEnvelope = self
            .call_form(
                "users.info",
                &[("user", user_id), ("include_locale", "true")],
            )
            .await?;
        Ok(envelope.user)
    }

    async fn auth_test(&self) -> Result<AuthIdentity, SlackError> {
        self.call_form("auth.test", &[]).await
    }

    async fn conversations_for_user(
        &self,
        cursor: Option<&str>,
    ) -> Result<ConversationPage, SlackError> {
        let mut params = vec![
            ("types", "public_channel,private_channel"),
            ("exclude_archived", "true"),
            ("limit", "200"),
        ];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor));
        }
        let envelope: ChannelsEnvelope = self.call_form("users.conversations", &params).await?;
        let next = envelope.response_metadata.next_cursor;
        Ok(ConversationPage {
            channels: envelope.channels,
            next_cursor: (!next.is_empty()).then_some(next),
        })
    }
}

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use devopsbot::{
    bot::BotState,
    build_state,
    config::{BotConfig, Cli},
    http,
};
use devopsbot_core::testkit::RecordingSlackClient;
use devopsbot_telemetry::{BotMetrics, BuildInfo};
use security::{
    SlackVerifier,
    signature::{SIGNATURE_HEADER, TIMESTAMP_HEADER},
};
use serde_json::Value;
use time::OffsetDateTime;

pub const SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";

pub const CONFIG: &str = r#"
slack:
  adminGroupID: SADMINS
  broadcastChannelID: CBROAD
incident:
  environments: [production, staging]
  regions: [eu-west-1]
  severityLevels: [low, high]
  impactLevels: [minor, major]
  docTemplateURL: https://docs.example.com/incident-template
"#;

pub struct TestBot {
    pub router: Router,
    pub slack: Arc<RecordingSlackClient>,
    pub state: BotState,
    pub verifier: Arc<SlackVerifier>,
}

impl TestBot {
    pub fn new(slack: RecordingSlackClient) -> Self {
        Self::with_config(slack, CONFIG)
    }

    pub fn with_config(slack: RecordingSlackClient, yaml: &str) -> Self {
        let cli = Cli {
            slack_access_token: Some("xoxb-test".into()),
            slack_signing_secret: Some(SECRET.into()),
            ..Cli::default()
        };
        let config = BotConfig::from_yaml(cli, yaml).unwrap();
        let slack = Arc::new(slack);
        let metrics = Arc::new(
            BotMetrics::new(
                &config.prometheus_namespace,
                &BuildInfo {
                    version: "0.0.0-test".into(),
                    revision: "test".into(),
                    rustc: "test".into(),
                },
            )
            .unwrap(),
        );
        let state = build_state(&config, slack.clone(), metrics).unwrap();
        let verifier = Arc::new(SlackVerifier::new(SECRET));
        Self {
            router: http::router(state.clone(), verifier.clone()),
            slack,
            state,
            verifier,
        }
    }

    /// A request to `uri` signed the way Slack signs it, stamped with the current time.
    pub fn signed(&self, uri: &str, body: String) -> Request<Body> {
        self.signed_at(uri, body, OffsetDateTime::now_utc().unix_timestamp())
    }

    pub fn signed_at(&self, uri: &str, body: String, timestamp: i64) -> Request<Body> {
        let (ts, signature) = self.verifier.sign(timestamp, body.as_bytes());
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(TIMESTAMP_HEADER, ts)
            .header(SIGNATURE_HEADER, signature)
            .body(Body::from(body))
            .unwrap()
    }

    pub fn command(&self, user: &str, text: &str) -> Request<Body> {
        self.signed("/bot/command", command_form("/devopsbot", user, text))
    }

    pub fn interaction(&self, payload: &Value) -> Request<Body> {
        self.signed("/bot/interactive", payload_form(payload))
    }
}

pub fn command_form(command: &str, user: &str, text: &str) -> String {
    serde_urlencoded::to_string([
        ("command", command),
        ("text", text),
        ("user_id", user),
        ("user_name", "jane"),
        ("channel_id", "C1"),
        ("channel_name", "general"),
        ("trigger_id", "trigger-1"),
        ("response_url", "https://hooks.slack.com/commands/1"),
    ])
    .unwrap()
}

pub fn payload_form(payload: &Value) -> String {
    serde_urlencoded::to_string([("payload", payload.to_string())]).unwrap()
}

pub async fn body_string(res: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(res: Response<Body>) -> Value {
    serde_json::from_str(&body_string(res).await).unwrap()
}

fn plain(text: &str) -> Value {
    serde_json::json!({ "type": "plain_text", "text": text })
}

pub fn option(value: &str) -> Value {
    serde_json::json!({ "text": plain(value), "value": value })
}

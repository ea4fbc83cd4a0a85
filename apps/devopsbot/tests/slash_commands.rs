mod common;

use std::io;

use axum::{
    body::{Body, Bytes},
    http::{Request, StatusCode, header},
};
use common::{TestBot, body_json, command_form};
use devopsbot_core::testkit::{RecordingSlackClient, SlackCall};
use security::signature::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
use time::OffsetDateTime;
use tower::ServiceExt;

#[tokio::test]
async fn help_lists_available_commands() {
    let bot = TestBot::new(RecordingSlackClient::new());

    let res = bot.router.clone().oneshot(bot.command("U1", "help")).await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["response_type"], "ephemeral");
    let text = body["text"].as_str().unwrap();
    assert!(text.starts_with("These are the available commands:"));
    assert!(text.contains("/devopsbot list"));
}

#[tokio::test]
async fn empty_and_unknown_text_fall_back_to_help() {
    let bot = TestBot::new(RecordingSlackClient::new());

    for text in ["", "   ", "status please"] {
        let res = bot.router.clone().oneshot(bot.command("U1", text)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert!(
            body["text"]
                .as_str()
                .unwrap()
                .contains("available commands"),
            "text {text:?}"
        );
    }
    assert_eq!(bot.slack.count("views.open"), 0);
}

#[tokio::test]
async fn help_follows_the_user_locale() {
    let bot = TestBot::new(RecordingSlackClient::new().with_user("UFR", "fr-FR"));

    let res = bot.router.clone().oneshot(bot.command("UFR", "help")).await.unwrap();

    let body = body_json(res).await;
    assert!(
        body["text"]
            .as_str()
            .unwrap()
            .starts_with("Voici les commandes disponibles")
    );
}

#[tokio::test]
async fn prefixed_command_names_are_accepted() {
    let bot = TestBot::new(RecordingSlackClient::new());
    let form = command_form("/staging-devopsbot", "U1", "help");

    let res = bot
        .router
        .clone()
        .oneshot(bot.signed("/bot/command", form))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn foreign_command_is_not_found_without_touching_slack() {
    let bot = TestBot::new(RecordingSlackClient::new());
    let form = command_form("/deploybot", "U1", "help");

    let res = bot
        .router
        .clone()
        .oneshot(bot.signed("/bot/command", form))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(bot.slack.calls().is_empty());
}

#[tokio::test]
async fn unsigned_request_is_not_found() {
    let bot = TestBot::new(RecordingSlackClient::new());
    let req = Request::post("/bot/command")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(command_form("/devopsbot", "U1", "help")))
        .unwrap();

    let res = bot.router.clone().oneshot(req).await.unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(bot.slack.calls().is_empty());
}

#[tokio::test]
async fn stale_or_tampered_requests_are_not_found() {
    let bot = TestBot::new(RecordingSlackClient::new());
    let form = command_form("/devopsbot", "U1", "help");

    let stale = bot.signed_at(
        "/bot/command",
        form.clone(),
        OffsetDateTime::now_utc().unix_timestamp() - 600,
    );
    let res = bot.router.clone().oneshot(stale).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let signed = bot.signed("/bot/command", form);
    let (parts, _) = signed.into_parts();
    let tampered = Request::from_parts(
        parts,
        Body::from(command_form("/devopsbot", "U1", "incident")),
    );
    let res = bot.router.clone().oneshot(tampered).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    assert!(bot.slack.calls().is_empty());
}

#[tokio::test]
async fn unreadable_body_is_a_server_error() {
    let bot = TestBot::new(RecordingSlackClient::new());
    let signed = bot.signed("/bot/command", command_form("/devopsbot", "U1", "help"));
    let ts = signed.headers()[TIMESTAMP_HEADER].clone();
    let sig = signed.headers()[SIGNATURE_HEADER].clone();
    let stream = futures::stream::iter(vec![
        Ok::<_, io::Error>(Bytes::from_static(b"command=")),
        Err(io::Error::other("connection reset")),
    ]);
    let req = Request::post("/bot/command")
        .header(TIMESTAMP_HEADER, ts)
        .header(SIGNATURE_HEADER, sig)
        .body(Body::from_stream(stream))
        .unwrap();

    let res = bot.router.clone().oneshot(req).await.unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn malformed_form_is_a_bad_request() {
    let bot = TestBot::new(RecordingSlackClient::new());

    let res = bot
        .router
        .clone()
        .oneshot(bot.signed(
            "/bot/command",
            "command=%2Fdevopsbot&command=%2Fdevopsbot&text=help".into(),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn user_lookup_failure_is_a_server_error() {
    let bot = TestBot::new(RecordingSlackClient::new());
    bot.slack.fail("users.info", "user_not_found");

    let res = bot.router.clone().oneshot(bot.command("U1", "help")).await.unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn incident_opens_the_declare_modal() {
    let bot = TestBot::new(RecordingSlackClient::new());

    let res = bot
        .router
        .clone()
        .oneshot(bot.command("U1", "incident"))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let opened = bot.slack.calls_to("views.open");
    assert_eq!(opened.len(), 1);
    let SlackCall::OpenView { trigger_id, view } = &opened[0] else {
        panic!("expected views.open");
    };
    assert_eq!(trigger_id, "trigger-1");
    assert_eq!(view["callback_id"], "declare_incident");
    assert_eq!(view["private_metadata"], "C1");
    let rendered = view.to_string();
    assert!(rendered.contains("incident_severity"));
    assert!(rendered.contains("production"));
}

#[tokio::test]
async fn resolve_opens_the_resolve_modal() {
    let bot = TestBot::new(RecordingSlackClient::new());

    let res = bot
        .router
        .clone()
        .oneshot(bot.command("U1", "resolve now"))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let SlackCall::OpenView { view, .. } = &bot.slack.calls_to("views.open")[0] else {
        panic!("expected views.open");
    };
    assert_eq!(view["callback_id"], "resolve_incident");
}

#[tokio::test]
async fn failed_modal_open_is_a_server_error() {
    let bot = TestBot::new(RecordingSlackClient::new());
    bot.slack.fail("views.open", "expired_trigger_id");

    let res = bot
        .router
        .clone()
        .oneshot(bot.command("U1", "incident"))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn list_shows_only_incident_channels() {
    let bot = TestBot::new(
        RecordingSlackClient::new()
            .with_channel("CGEN", "general")
            .with_channel("CINC9", "inc_db_oct_1"),
    );

    let res = bot.router.clone().oneshot(bot.command("U1", "list")).await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let text = body_json(res).await["text"].as_str().unwrap().to_string();
    assert!(text.contains("<#CINC9>"));
    assert!(!text.contains("CGEN"));
}

#[tokio::test]
async fn list_without_incidents_says_so() {
    let bot = TestBot::new(RecordingSlackClient::new().with_channel("CGEN", "general"));

    let res = bot.router.clone().oneshot(bot.command("U1", "list")).await.unwrap();

    assert_eq!(body_json(res).await["text"], "There are no open incidents");
}

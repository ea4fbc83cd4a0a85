use std::{sync::Arc, time::Duration};

use anyhow::{Context as _, Result};
use axum::serve;
use clap::Parser;
use devopsbot::{
    build_state,
    config::{BotConfig, Cli},
    http, tls,
};
use devopsbot_core::slack::SlackWebClient;
use devopsbot_telemetry::{BotMetrics, BuildInfo};
use security::SlackVerifier;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(15);
const SLACK_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    devopsbot_telemetry::install(
        "devopsbot",
        env!("CARGO_PKG_VERSION"),
        cli.verbose,
        cli.trace,
    )?;

    let config = BotConfig::load(cli).context("loading configuration")?;
    if let Some(path) = &config.source {
        info!(path = %path.display(), "config file loaded");
    }

    let build = BuildInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        revision: option_env!("DEVOPSBOT_REVISION").unwrap_or("unknown").to_string(),
        rustc: option_env!("DEVOPSBOT_RUSTC").unwrap_or("unknown").to_string(),
    };
    let metrics = Arc::new(BotMetrics::new(&config.prometheus_namespace, &build)?);

    let http_client = reqwest::Client::builder()
        .timeout(SLACK_TIMEOUT)
        .build()
        .context("building Slack HTTP client")?;
    let slack = Arc::new(SlackWebClient::new(
        http_client,
        config.slack.access_token.clone(),
        config.slack.api_base.clone(),
    ));
    let verifier = Arc::new(SlackVerifier::new(config.slack.signing_secret.clone()));

    let state = build_state(&config, slack, metrics)?;
    let tasks = state.tasks.clone();
    let router = http::router(state, verifier);

    let tls_shutdown = CancellationToken::new();
    let tls_listener = match tls::load_server_config(&config.tls.cert, &config.tls.key) {
        Ok(tls_config) => match TcpListener::bind(config.tls.addr).await {
            Ok(listener) => Some(tokio::spawn(tls::serve(
                listener,
                tls_config,
                router.clone(),
                tls_shutdown.clone(),
            ))),
            Err(err) => {
                warn!(error = %err, addr = %config.tls.addr, "failed to bind tls listener");
                None
            }
        },
        Err(err) => {
            warn!(error = %err, "tls disabled");
            None
        }
    };

    let listener = TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("binding {}", config.addr))?;
    info!(addr = %config.addr, "devopsbot listening");

    serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown requested");
        })
        .await?;

    tls_shutdown.cancel();
    if let Some(handle) = tls_listener {
        handle.await.ok();
    }
    if !tasks.shutdown(SHUTDOWN_GRACE).await {
        warn!(pending = tasks.pending(), "background tasks did not finish in time");
    }
    info!("devopsbot stopped");
    Ok(())
}

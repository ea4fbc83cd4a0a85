//! devopsbot: a Slack bot for declaring and resolving operational incidents.
//!
//! [`build_state`] wires the configuration into the shared handler state and
//! [`http::router`] turns that state into the served application.

pub mod bot;
pub mod config;
pub mod http;
pub mod i18n;
pub mod tls;

use std::sync::Arc;

use anyhow::Context as _;
use devopsbot_core::{AdminCache, slack::SlackClient};
use devopsbot_telemetry::SharedMetrics;

use bot::{BotOptions, BotState, tasks::TaskRunner};
use config::BotConfig;
use i18n::Catalogs;

pub fn build_state(
    config: &BotConfig,
    slack: Arc<dyn SlackClient>,
    metrics: SharedMetrics,
) -> anyhow::Result<BotState> {
    let catalogs = Catalogs::embedded().context("loading message catalogs")?;
    let admins = config
        .slack
        .admin_group_id
        .as_ref()
        .map(|group| Arc::new(AdminCache::new(group.clone())));
    let tasks = TaskRunner::new(slack.clone(), admins, catalogs.clone(), metrics.clone());

    Ok(BotState {
        slack,
        options: Arc::new(BotOptions::from(config)),
        catalogs,
        tasks,
        metrics,
    })
}

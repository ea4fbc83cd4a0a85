use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_ADDR: &str = "0.0.0.0:3333";
pub const DEFAULT_TLS_ADDR: &str = "0.0.0.0:3443";
pub const DEFAULT_TLS_CERT: &str = "devopsbot.pem";
pub const DEFAULT_TLS_KEY: &str = "devopsbot-key.pem";
pub const DEFAULT_NAMESPACE: &str = "devopsbot";

const CONFIG_FILE_NAME: &str = "config.yaml";
const CONFIG_SEARCH_PATHS: &[&str] = &[".", "./config", "../config"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{setting} must be a JSON array of strings: {source}")]
    InvalidList {
        setting: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("{setting} is not a valid listen address: {value}")]
    InvalidAddr { setting: &'static str, value: String },
    #[error("config file {path} could not be read: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config file {path} is not valid YAML: {source}")]
    ParseFile {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Command line flags. Every flag can also be given through its environment variable and
/// overrides the config file.
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "devopsbot",
    version,
    about = "devopsbot improves efficiency by automating tasks"
)]
pub struct Cli {
    /// address:port to listen on
    #[arg(short = 'a', long, env = "DEVOPSBOT_ADDR")]
    pub addr: Option<String>,
    /// address:port to listen on for TLS
    #[arg(long, env = "DEVOPSBOT_TLS_ADDR")]
    pub tls_addr: Option<String>,
    /// Path to TLS certificate
    #[arg(long, env = "DEVOPSBOT_TLS_CERT")]
    pub tls_cert: Option<PathBuf>,
    /// Path to TLS private key
    #[arg(long, env = "DEVOPSBOT_TLS_KEY")]
    pub tls_key: Option<PathBuf>,
    /// Output extra logs
    #[arg(short = 'v', long, env = "DEVOPSBOT_VERBOSE")]
    pub verbose: bool,
    /// Output trace logs
    #[arg(short = 't', long, env = "DEVOPSBOT_TRACE")]
    pub trace: bool,
    /// Slack bot access token
    #[arg(long, env = "DEVOPSBOT_SLACK_ACCESS_TOKEN", hide_env_values = true)]
    pub slack_access_token: Option<String>,
    /// Slack bot signing secret
    #[arg(long, env = "DEVOPSBOT_SLACK_SIGNING_SECRET", hide_env_values = true)]
    pub slack_signing_secret: Option<String>,
    /// Slack ID for the admin user group
    #[arg(long, env = "DEVOPSBOT_SLACK_ADMIN_GROUP_ID")]
    pub slack_admin_group_id: Option<String>,
    /// Slack ID for the channel to use as the broadcast channel
    #[arg(long, env = "DEVOPSBOT_SLACK_BROADCAST_CHANNEL_ID")]
    pub slack_broadcast_channel_id: Option<String>,
    /// Base URL of the Slack Web API
    #[arg(long, env = "DEVOPSBOT_SLACK_API_BASE")]
    pub slack_api_base: Option<String>,
    /// URL of the incident document template
    #[arg(long, env = "DEVOPSBOT_INCIDENT_DOC_TEMPLATE_URL")]
    pub incident_doc_template_url: Option<String>,
    /// JSON array of environments that can be affected
    #[arg(long, env = "DEVOPSBOT_INCIDENT_ENVIRONMENTS")]
    pub incident_environments: Option<String>,
    /// JSON array of regions that can be affected
    #[arg(long, env = "DEVOPSBOT_INCIDENT_REGIONS")]
    pub incident_regions: Option<String>,
    /// JSON array of severity levels
    #[arg(long, env = "DEVOPSBOT_INCIDENT_SEVERITY_LEVELS")]
    pub incident_severity_levels: Option<String>,
    /// JSON array of impact levels
    #[arg(long, env = "DEVOPSBOT_INCIDENT_IMPACT_LEVELS")]
    pub incident_impact_levels: Option<String>,
    /// Namespace of the exported Prometheus metrics
    #[arg(long, env = "DEVOPSBOT_PROMETHEUS_NAMESPACE")]
    pub prometheus_namespace: Option<String>,
    /// Config file to read (optional)
    #[arg(long, env = "DEVOPSBOT_CONFIG")]
    pub config: Option<PathBuf>,
}

/// A list setting: either a YAML sequence or a JSON-encoded string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ListSetting {
    Items(Vec<String>),
    Json(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    addr: Option<String>,
    tls: FileTls,
    slack: FileSlack,
    incident: FileIncident,
    server: FileServer,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileTls {
    addr: Option<String>,
    cert: Option<PathBuf>,
    key: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct FileSlack {
    access_token: Option<String>,
    signing_secret: Option<String>,
    #[serde(rename = "adminGroupID")]
    admin_group_id: Option<String>,
    #[serde(rename = "broadcastChannelID")]
    broadcast_channel_id: Option<String>,
    api_base: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct FileIncident {
    environments: Option<ListSetting>,
    regions: Option<ListSetting>,
    severity_levels: Option<ListSetting>,
    impact_levels: Option<ListSetting>,
    #[serde(rename = "docTemplateURL")]
    doc_template_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct FileServer {
    prometheus_namespace: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TlsSettings {
    pub addr: SocketAddr,
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Clone)]
pub struct SlackSettings {
    pub access_token: String,
    pub signing_secret: String,
    pub admin_group_id: Option<String>,
    pub broadcast_channel_id: String,
    pub api_base: Option<String>,
}

impl std::fmt::Debug for SlackSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackSettings")
            .field("access_token", &"<redacted>")
            .field("signing_secret", &"<redacted>")
            .field("admin_group_id", &self.admin_group_id)
            .field("broadcast_channel_id", &self.broadcast_channel_id)
            .field("api_base", &self.api_base)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncidentSettings {
    pub environments: Vec<String>,
    pub regions: Vec<String>,
    pub severity_levels: Vec<String>,
    pub impact_levels: Vec<String>,
    pub doc_template_url: String,
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub addr: SocketAddr,
    pub tls: TlsSettings,
    pub verbose: bool,
    pub trace: bool,
    pub slack: SlackSettings,
    pub incident: IncidentSettings,
    pub prometheus_namespace: String,
    /// The config file that was read, if any.
    pub source: Option<PathBuf>,
}

impl BotConfig {
    /// Reads the optional config file and merges it under the flags.
    ///
    /// An explicitly named file must exist; otherwise `config.yaml` is looked up in `.`,
    /// `./config` and `../config`.
    pub fn load(cli: Cli) -> Result<Self, ConfigError> {
        let (file, source) = match cli.config.clone() {
            Some(path) => (read_file(&path)?, Some(path)),
            None => match find_config_file(Path::new(".")) {
                Some(path) => (read_file(&path)?, Some(path)),
                None => (FileConfig::default(), None),
            },
        };
        let mut config = Self::resolve(cli, file)?;
        config.source = source;
        Ok(config)
    }

    /// Loads settings from a YAML document and flags, without touching the filesystem.
    pub fn from_yaml(cli: Cli, yaml: &str) -> Result<Self, ConfigError> {
        let file = serde_yaml::from_str(yaml).map_err(|source| ConfigError::ParseFile {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        Self::resolve(cli, file)
    }

    fn resolve(cli: Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let addr = parse_addr(
            "addr",
            cli.addr.or(file.addr).as_deref().unwrap_or(DEFAULT_ADDR),
        )?;
        let tls = TlsSettings {
            addr: parse_addr(
                "tls.addr",
                cli.tls_addr
                    .or(file.tls.addr)
                    .as_deref()
                    .unwrap_or(DEFAULT_TLS_ADDR),
            )?,
            cert: cli
                .tls_cert
                .or(file.tls.cert)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TLS_CERT)),
            key: cli
                .tls_key
                .or(file.tls.key)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TLS_KEY)),
        };

        let access_token = non_empty(cli.slack_access_token.or(file.slack.access_token))
            .ok_or(ConfigError::Missing("slack access token"))?;
        let signing_secret = non_empty(cli.slack_signing_secret.or(file.slack.signing_secret))
            .ok_or(ConfigError::Missing("slack signing secret"))?;
        let slack = SlackSettings {
            access_token,
            signing_secret,
            admin_group_id: non_empty(cli.slack_admin_group_id.or(file.slack.admin_group_id)),
            broadcast_channel_id: non_empty(
                cli.slack_broadcast_channel_id
                    .or(file.slack.broadcast_channel_id),
            )
            .unwrap_or_default(),
            api_base: non_empty(cli.slack_api_base.or(file.slack.api_base)),
        };

        let incident = IncidentSettings {
            environments: parse_list(
                "incident.environments",
                cli.incident_environments
                    .map(ListSetting::Json)
                    .or(file.incident.environments),
            )?,
            regions: parse_list(
                "incident.regions",
                cli.incident_regions
                    .map(ListSetting::Json)
                    .or(file.incident.regions),
            )?,
            severity_levels: parse_list(
                "incident.severityLevels",
                cli.incident_severity_levels
                    .map(ListSetting::Json)
                    .or(file.incident.severity_levels),
            )?,
            impact_levels: parse_list(
                "incident.impactLevels",
                cli.incident_impact_levels
                    .map(ListSetting::Json)
                    .or(file.incident.impact_levels),
            )?,
            doc_template_url: cli
                .incident_doc_template_url
                .or(file.incident.doc_template_url)
                .unwrap_or_default(),
        };

        Ok(Self {
            addr,
            tls,
            verbose: cli.verbose,
            trace: cli.trace,
            slack,
            incident,
            prometheus_namespace: non_empty(
                cli.prometheus_namespace
                    .or(file.server.prometheus_namespace),
            )
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            source: None,
        })
    }
}

fn find_config_file(base: &Path) -> Option<PathBuf> {
    CONFIG_SEARCH_PATHS
        .iter()
        .map(|dir| base.join(dir).join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&raw).map_err(|source| ConfigError::ParseFile {
        path: path.to_path_buf(),
        source,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Accepts `host:port` and the `:port` shorthand.
fn parse_addr(setting: &'static str, value: &str) -> Result<SocketAddr, ConfigError> {
    let candidate = if value.starts_with(':') {
        format!("0.0.0.0{value}")
    } else {
        value.to_string()
    };
    candidate.parse().map_err(|_| ConfigError::InvalidAddr {
        setting,
        value: value.to_string(),
    })
}

fn parse_list(
    setting: &'static str,
    value: Option<ListSetting>,
) -> Result<Vec<String>, ConfigError> {
    match value {
        None => Ok(Vec::new()),
        Some(ListSetting::Items(items)) => Ok(items),
        Some(ListSetting::Json(raw)) if raw.trim().is_empty() => Ok(Vec::new()),
        Some(ListSetting::Json(raw)) => serde_json::from_str(&raw)
            .map_err(|source| ConfigError::InvalidList { setting, source }),
    }
}

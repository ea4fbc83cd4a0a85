use std::env;

use tracing::Level;

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: String,
    pub json_logs: bool,
    /// Level used when `RUST_LOG` is not set.
    pub default_level: Level,
}

impl TelemetryConfig {
    /// Reads `LOG_FORMAT`; JSON unless it says `text`, `pretty` or `plain`.
    pub fn from_env(default_service_name: &str, default_service_version: &str) -> Self {
        let json_logs = env::var("LOG_FORMAT")
            .map(|v| !matches!(v.to_lowercase().as_str(), "text" | "pretty" | "plain"))
            .unwrap_or(true);
        Self {
            service_name: default_service_name.to_string(),
            service_version: default_service_version.to_string(),
            json_logs,
            default_level: Level::INFO,
        }
    }

    /// `--verbose` selects `debug`, `--trace` selects `trace` and wins over `--verbose`.
    pub fn with_verbosity(mut self, verbose: bool, trace: bool) -> Self {
        self.default_level = if trace {
            Level::TRACE
        } else if verbose {
            Level::DEBUG
        } else {
            Level::INFO
        };
        self
    }
}

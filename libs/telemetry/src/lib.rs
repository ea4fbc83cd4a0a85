//! Observability helpers for devopsbot: subscriber setup, access log levels and the Prometheus
//! registry.

pub mod access;
pub mod config;
pub mod metrics;
pub mod tracing_init;

pub use access::access_log_level;
pub use config::TelemetryConfig;
pub use metrics::{BotMetrics, BuildInfo, MetricsError, SharedMetrics};
pub use tracing_init::init_tracing;

/// Installs the subscriber for `service_name`, honouring `LOG_FORMAT`, `RUST_LOG` and the
/// verbosity flags.
pub fn install(service_name: &str, version: &str, verbose: bool, trace: bool) -> anyhow::Result<()> {
    let cfg = TelemetryConfig::from_env(service_name, version).with_verbosity(verbose, trace);
    init_tracing(&cfg)
}

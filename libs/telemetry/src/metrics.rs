//! Prometheus metrics exported on `/metrics`.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `<ns>_build_info` | Gauge (constant 1) | `version`, `revision`, `rustc`, `arch`, `os` |
//! | `<ns>_http_requests_total` | Counter | `path`, `status` |
//! | `<ns>_incidents_total` | Counter | `action` |
//! | `<ns>_task_step_failures_total` | Counter | `sequence`, `step` |

use std::sync::Arc;

use prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};
use thiserror::Error;

/// Label values longer than this are cut, so user-controlled paths cannot blow up cardinality.
pub const MAX_LABEL_VALUE_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    RegistrationFailed(#[from] prometheus::Error),
    #[error("failed to encode metrics: {0}")]
    EncodingFailed(String),
}

pub type MetricsResult<T> = Result<T, MetricsError>;

/// Labels of the `build_info` gauge.
#[derive(Debug, Clone, Default)]
pub struct BuildInfo {
    pub version: String,
    pub revision: String,
    pub rustc: String,
}

#[derive(Clone)]
pub struct BotMetrics {
    registry: Registry,
    http_requests_total: CounterVec,
    incidents_total: CounterVec,
    task_step_failures_total: CounterVec,
}

impl BotMetrics {
    pub fn new(namespace: &str, build: &BuildInfo) -> MetricsResult<Self> {
        let registry = Registry::new();

        let build_info = GaugeVec::new(
            Opts::new("build_info", "Build information, constant 1").namespace(namespace),
            &["version", "revision", "rustc", "arch", "os"],
        )?;
        registry.register(Box::new(build_info.clone()))?;
        build_info
            .with_label_values(&[
                build.version.as_str(),
                build.revision.as_str(),
                build.rustc.as_str(),
                std::env::consts::ARCH,
                std::env::consts::OS,
            ])
            .set(1.0);

        let http_requests_total = CounterVec::new(
            Opts::new("http_requests_total", "HTTP requests by path and status")
                .namespace(namespace),
            &["path", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let incidents_total = CounterVec::new(
            Opts::new("incidents_total", "Incidents handed to the task runner by action")
                .namespace(namespace),
            &["action"],
        )?;
        registry.register(Box::new(incidents_total.clone()))?;

        let task_step_failures_total = CounterVec::new(
            Opts::new(
                "task_step_failures_total",
                "Failed steps of background incident sequences",
            )
            .namespace(namespace),
            &["sequence", "step"],
        )?;
        registry.register(Box::new(task_step_failures_total.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            incidents_total,
            task_step_failures_total,
        })
    }

    pub fn http_request(&self, path: &str, status: u16) {
        let status = status.to_string();
        self.http_requests_total
            .with_label_values(&[truncate_label(path), status.as_str()])
            .inc();
    }

    #[must_use]
    pub fn http_request_count(&self, path: &str, status: u16) -> f64 {
        let status = status.to_string();
        self.http_requests_total
            .with_label_values(&[truncate_label(path), status.as_str()])
            .get()
    }

    pub fn incident(&self, action: &str) {
        self.incidents_total
            .with_label_values(&[truncate_label(action)])
            .inc();
    }

    #[must_use]
    pub fn incident_count(&self, action: &str) -> f64 {
        self.incidents_total
            .with_label_values(&[truncate_label(action)])
            .get()
    }

    pub fn step_failed(&self, sequence: &str, step: &str) {
        self.task_step_failures_total
            .with_label_values(&[truncate_label(sequence), truncate_label(step)])
            .inc();
    }

    #[must_use]
    pub fn step_failure_count(&self, sequence: &str, step: &str) -> f64 {
        self.task_step_failures_total
            .with_label_values(&[truncate_label(sequence), truncate_label(step)])
            .get()
    }

    /// Prometheus text exposition of every registered metric.
    pub fn encode_text(&self) -> MetricsResult<String> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|e| MetricsError::EncodingFailed(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingFailed(e.to_string()))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

pub type SharedMetrics = Arc<BotMetrics>;

fn truncate_label(value: &str) -> &str {
    if value.len() <= MAX_LABEL_VALUE_LEN {
        return value;
    }
    let end = value
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= MAX_LABEL_VALUE_LEN)
        .last()
        .unwrap_or(0);
    &value[..end]
}

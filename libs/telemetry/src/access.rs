//! Level selection for per-request access log lines.

use http::StatusCode;
use tracing::Level;

/// Paths polled by health checks and scrapers; logged at `debug` to keep the access log readable.
pub const QUIET_PATHS: &[&str] = &["/metrics", "/live", "/ready"];

pub fn access_log_level(path: &str, status: StatusCode) -> Level {
    if QUIET_PATHS.contains(&path) || status == StatusCode::TOO_MANY_REQUESTS {
        return Level::DEBUG;
    }
    if status.is_server_error() {
        Level::ERROR
    } else if status.is_client_error() {
        Level::WARN
    } else if status == StatusCode::OK {
        Level::INFO
    } else {
        Level::DEBUG
    }
}

/// Emits one access log line at the level chosen by [`access_log_level`].
#[macro_export]
macro_rules! access_event {
    ($level:expr, $($fields:tt)+) => {
        match $level {
            ::tracing::Level::ERROR => ::tracing::error!($($fields)+),
            ::tracing::Level::WARN => ::tracing::warn!($($fields)+),
            ::tracing::Level::INFO => ::tracing::info!($($fields)+),
            ::tracing::Level::DEBUG => ::tracing::debug!($($fields)+),
            _ => ::tracing::trace!($($fields)+),
        }
    };
}

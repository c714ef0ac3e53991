//! Subscriber setup and structured log macros.
//!
//! Every event carries the same field names so logs can be filtered
//! uniformly:
//! - `component`: `session`, `chain` or `pool`
//! - `endpoint`: server in `host:port:t` form
//! - `height` / `hash`: header position and display-order hash

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{TelemetryConfig, TelemetryError};

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Fails if a global
/// subscriber is already installed.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| TelemetryError::Filter(e.to_string()))?;

    if config.json_logs {
        // JSON output for log shipping
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .try_init()
            .map_err(|e| TelemetryError::Init(e.to_string()))?;
    } else {
        // Pretty output for development
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_ansi(config.ansi);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::Init(e.to_string()))?;
    }

    tracing::info!(
        service = %config.service_name,
        json = config.json_logs,
        "Logging initialized"
    );
    Ok(())
}

/// Log an event about one server session.
///
/// ```rust,ignore
/// log_session_event!(warn, endpoint, "Session closed", reason = "timeout");
/// ```
#[macro_export]
macro_rules! log_session_event {
    ($level:ident, $endpoint:expr, $msg:expr $(, $($field:tt)*)?) => {
        ::tracing::$level!(
            component = "session",
            endpoint = %$endpoint,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log an event about one header.
///
/// ```rust,ignore
/// log_header_event!(info, height, hash, "New tip");
/// ```
#[macro_export]
macro_rules! log_header_event {
    ($level:ident, $height:expr, $hash:expr, $msg:expr $(, $($field:tt)*)?) => {
        ::tracing::$level!(
            component = "chain",
            height = $height,
            hash = %$hash,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log an event about the pool as a whole.
#[macro_export]
macro_rules! log_pool_event {
    ($level:ident, $msg:expr $(, $($field:tt)*)?) => {
        ::tracing::$level!(
            component = "pool",
            $($($field)*,)?
            $msg
        )
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_macros_expand() {
        let endpoint = "electrum.example:50001:t";
        let hash = "00ff";
        log_session_event!(info, endpoint, "Session ready");
        log_session_event!(warn, endpoint, "Session closed", reason = "eof");
        log_header_event!(debug, 7u64, hash, "Header stored");
        log_header_event!(info, 8u64, hash, "New tip", work = 3);
        log_pool_event!(info, "Primary elected", primary = %endpoint);
    }
}

//! Tracing subscriber setup for REGIMEN binaries
//!
//! Library code only emits `tracing` events; binaries call [`init_tracing`]
//! once at startup to decide where they go.

use regimen_core::{ConfigError, RegimenResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    /// Read `REGIMEN_LOG_FORMAT` (`text` or `json`), defaulting to text.
    pub fn from_env() -> Self {
        match std::env::var("REGIMEN_LOG_FORMAT")
            .map(|s| s.trim().to_lowercase())
            .as_deref()
        {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Install the global subscriber. The filter comes from `RUST_LOG`,
/// falling back to `regimen_engine=info,warn`.
pub fn init_tracing(format: LogFormat) -> RegimenResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("regimen_engine=info,warn"));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };

    result.map_err(|e| {
        ConfigError::InvalidValue {
            field: "tracing_subscriber".to_string(),
            value: format!("{:?}", format),
            reason: format!("Failed to init subscriber: {}", e),
        }
        .into()
    })
}

use tracing::level_filters::LevelFilter;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::counters;
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

/// Crates whose events follow `logging.level`; everything else (hyper, redis)
/// is held at `warn` unless `RUST_LOG` says otherwise.
const SERVICE_TARGET: &str = "rescache";

/// Install the global subscriber and describe the cache counters.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    counters::describe();

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directives(logging.level))
            .map_err(|err| InfraError::telemetry(format!("invalid log filter: {err}")))?,
    };

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| InfraError::telemetry(format!("subscriber already installed: {err}")))
}

fn default_directives(level: LevelFilter) -> String {
    let others = level.min(LevelFilter::WARN);
    format!(
        "{},{SERVICE_TARGET}={}",
        others.to_string().to_ascii_lowercase(),
        level.to_string().to_ascii_lowercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_level_applies_to_own_targets_only() {
        assert_eq!(default_directives(LevelFilter::DEBUG), "warn,rescache=debug");
        assert_eq!(default_directives(LevelFilter::ERROR), "error,rescache=error");
        assert!(EnvFilter::try_new(default_directives(LevelFilter::TRACE)).is_ok());
    }
}

//! Tracing subscriber setup for hosts embedding the engine.

use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;

/// Environment variable that overrides [`TelemetryConfig::filter`].
pub const LOG_ENV_VAR: &str = "OPFORGE_LOG";

/// Builds the `EnvFilter`, preferring `OPFORGE_LOG` over the configured directive.
#[must_use]
pub fn env_filter(config: &TelemetryConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs a global `fmt` subscriber.
///
/// Returns `false` if a global subscriber was already set (for example by the
/// host or by an earlier call), in which case nothing changes.
pub fn init_tracing(config: &TelemetryConfig) -> bool {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter(config));
    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_directive_falls_back_to_info() {
        let config = TelemetryConfig {
            filter: "not a [valid directive".to_string(),
            json: false,
        };
        // Must not panic regardless of OPFORGE_LOG in the environment.
        let _filter = env_filter(&config);
    }

    #[test]
    fn second_init_is_a_no_op() {
        let config = TelemetryConfig::default();
        let _first = init_tracing(&config);
        assert!(!init_tracing(&config));
    }
}

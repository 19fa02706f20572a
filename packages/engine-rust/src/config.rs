use std::time::Duration;

use serde::Deserialize;

/// Engine-level configuration for executor construction and dispatch.
///
/// Controls completion timeouts for non-blocking operations, dispatch
/// timeouts and concurrency limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on how long the registry waits for an operation's outcome,
    /// in milliseconds. Request deadlines can only shorten it.
    pub completion_timeout_ms: u64,
    /// Default timeout for dispatched operations in milliseconds.
    pub default_operation_timeout_ms: u64,
    /// Operations whose work may still be running before new requests are
    /// shed. Work that outlived its deadline still counts.
    pub max_concurrent_operations: u32,
}

impl EngineConfig {
    #[must_use]
    pub fn completion_timeout(&self) -> Duration {
        Duration::from_millis(self.completion_timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            completion_timeout_ms: 30_000,
            default_operation_timeout_ms: 30_000,
            max_concurrent_operations: 1000,
        }
    }
}

/// Log output settings used by [`init_tracing`](crate::telemetry::init_tracing).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive used when `OPFORGE_LOG` is unset.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.completion_timeout(), Duration::from_secs(30));
        assert_eq!(config.default_operation_timeout_ms, 30_000);
        assert_eq!(config.max_concurrent_operations, 1000);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"completion_timeout_ms": 250}"#).unwrap();
        assert_eq!(config.completion_timeout(), Duration::from_millis(250));
        assert_eq!(config.max_concurrent_operations, 1000);
    }

    #[test]
    fn telemetry_config_defaults() {
        let config = TelemetryConfig::default();
        assert_eq!(config.filter, "info");
        assert!(!config.json);
    }
}

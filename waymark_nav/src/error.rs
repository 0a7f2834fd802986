// Error types surfaced at the engine's seams.
//
// Only configuration can fail in a way the host must handle. Everything that
// goes wrong at runtime (unreachable goals, stale plans, desyncs, storage
// failures) is expressed as an outcome enum or logged and absorbed; see
// `navigator.rs` for the single terminal status per goal.

/// Reasons a `PathingConfig` cannot be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

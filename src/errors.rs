use thiserror::Error;

/// Typed error hierarchy for apibridge.
///
/// These are the startup-fatal kinds: anything that goes wrong before the
/// transport accepts traffic (spec loading, tool synthesis, listener bind)
/// terminates the process with exit code 1. Per-call failures live in
/// [`crate::executor::ExecError`] and are surfaced inside MCP results, never
/// as process errors. Internal/leaf functions can continue using
/// `anyhow::Result` — the `Internal` variant allows seamless conversion via
/// the `?` operator.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Fetch/read/parse failure or an unsafe YAML construct in the spec.
    #[error("Failed to load OpenAPI spec: {0}")]
    SpecLoad(String),

    /// The spec parsed but is missing required structure (no `paths`,
    /// unresolvable non-cycle `$ref`, …).
    #[error("Malformed OpenAPI spec: {0}")]
    SpecShape(String),

    /// A tool id could not be generated (double-colon in path, empty
    /// method, path too long to represent).
    #[error("Tool id error: {0}")]
    ToolId(String),

    /// Configuration error (bad flag combination, unparseable header, …).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport startup failure (bind, listener).
    #[error("Transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience alias for results using `BridgeError`.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

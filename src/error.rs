//! Error types for the Airkeeper update cycle.
//!
//! Errors fall into four kinds (see spec §7):
//! 1. Fatal config errors — abort the whole cycle.
//! 2. Per-provider failures — drop one provider, others continue.
//! 3. Per-work-unit failures — log and skip one API call / condition check / submission.
//! 4. Validation mismatches — non-fatal skip with a warning.
//!
//! Only kind 1 ([`KeeperError`]) ever propagates out of [`crate::cycle::run_cycle`]; the
//! other three are logged at their point of occurrence and never escape their component.

use thiserror::Error;

/// Fatal errors that abort the whole cycle before any network I/O is attempted,
/// or that prevent the invocation from producing a response at all.
#[derive(Debug, Error)]
pub enum KeeperError {
    /// The merged configuration failed validation (§4.1).
    #[error("invalid airkeeper configuration: {0}")]
    InvalidConfig(#[from] crate::config::ConfigError),

    /// The configuration file could not be read or parsed.
    #[error("could not load configuration: {0}")]
    ConfigLoad(#[from] std::io::Error),

    #[error("could not parse configuration json: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

/// Per-provider failure (§7 kind 2): the provider is dropped for this cycle, others continue.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to fetch current block: {0}")]
    CurrentBlock(String),
    #[error("failed to fetch gas target: {0}")]
    GasTarget(String),
    #[error("rpc transport error: {0}")]
    Transport(String),
}

/// Per-work-unit failure (§7 kind 3): one API call, condition check, or submission is
/// logged and skipped; other work units proceed unaffected.
#[derive(Debug, Error)]
pub enum WorkUnitError {
    #[error("api call failed: {0}")]
    ApiCall(String),
    #[error("api response missing reserved parameter `_type`")]
    MissingType,
    #[error("condition check failed: {0}")]
    Condition(String),
    #[error("event history fetch failed: {0}")]
    EventHistory(String),
    #[error("transaction submission failed: {0}")]
    Submission(String),
    #[error("nonce fetch failed: {0}")]
    NonceFetch(String),
}

/// Validation mismatch (§7 kind 4): a derived hash did not match a declared id, or a
/// referenced id could not be resolved. Always a non-fatal skip with a warning.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("referenced subscription id {0} not found")]
    SubscriptionNotFound(String),
    #[error("subscription id mismatch: declared {declared}, derived {derived}")]
    SubscriptionIdMismatch { declared: String, derived: String },
    #[error("template id mismatch: declared {declared}, derived {derived}")]
    TemplateIdMismatch { declared: String, derived: String },
    #[error("endpoint id mismatch: declared {declared}, derived {derived}")]
    EndpointIdMismatch { declared: String, derived: String },
    #[error("referenced template id {0} not found")]
    TemplateNotFound(String),
    #[error("referenced endpoint id {0} not found")]
    EndpointNotFound(String),
    #[error("invalid deviationPercentage: {0}")]
    InvalidDeviationPercentage(String),
}

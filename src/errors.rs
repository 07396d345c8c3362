//! Typed error hierarchy for the funnel engine.
//!
//! Two top-level enums cover the two failure surfaces:
//! - `EngineError` — definition loading and configuration faults
//! - `StoreError` — remote persistence transport failures
//!
//! Visitor-facing rejections (consent unchecked, missing policy URL,
//! required answer empty) are not errors: they are modeled as
//! `AdvanceOutcome::Rejected` variants on the sequencer so the engine
//! boundary never throws for recoverable visitor states.

use thiserror::Error;

/// Errors from definition loading and engine configuration.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to read funnel definition at {path}: {source}")]
    DefinitionReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse funnel definition at {path}: {source}")]
    DefinitionParseFailed {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Funnel {funnel_id} contains duplicate step id {step_id}")]
    DuplicateStepId { funnel_id: String, step_id: String },

    #[error("Funnel {funnel_id} has no steps")]
    EmptyFunnel { funnel_id: String },

    #[error("Failed to read config at {path}: {source}")]
    ConfigReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    ConfigParseFailed {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the remote persistence endpoints (lead upsert, event
/// recording). These never cross the sequencer boundary: the lead saver
/// folds them into a `SaveOutcome::Deferred` and the event recorder logs
/// them, so a backend hiccup can never trap a visitor mid-funnel.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Endpoint returned {status}: {message}")]
    Endpoint { status: u16, message: String },

    #[error("Failed to serialize request payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

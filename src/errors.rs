//! Typed error hierarchy for the dialflow engine.
//!
//! Four top-level enums cover the four subsystems:
//! - `ParseError` — contact-list parsing failures
//! - `StoreError` — persistence-layer record violations
//! - `GatewayError` — calling-bridge transport and protocol failures
//! - `SequencerError` — campaign precondition and lifecycle failures

use thiserror::Error;

/// Errors from the contact-list parser.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Contact list is empty")]
    Empty,

    #[error("No recognizable {field} column in header: {header}")]
    ColumnNotFound { field: &'static str, header: String },

    #[error("Malformed row {row}: {source}")]
    MalformedRow {
        row: u64,
        #[source]
        source: csv::Error,
    },

    #[error("No valid leads found in contact list")]
    NoValidContacts,
}

/// Errors from the persistence layer that callers match on.
/// Routine I/O failures stay as `anyhow` context; these carry decisions.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Prompt {id} not found")]
    PromptNotFound { id: String },

    #[error("Prompt {id} was modified concurrently (expected version {expected}, found {actual})")]
    PromptVersionConflict {
        id: String,
        expected: i64,
        actual: i64,
    },

    #[error("Campaign {id} not found")]
    CampaignNotFound { id: i64 },
}

/// Errors from the calling-gateway client.
///
/// An upstream rejection with a well-formed JSON body is NOT an error; it
/// comes back as a `CallAcceptance` with `success: false` so the upstream
/// status can be relayed. These variants cover the cases where no usable
/// acceptance response exists at all.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Calling bridge request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Calling bridge returned HTTP {status} with a non-JSON body: {snippet}")]
    UpstreamBody { status: u16, snippet: String },
}

/// Errors from the campaign sequencer.
#[derive(Debug, Error)]
pub enum SequencerError {
    #[error("Campaign {id} not found")]
    CampaignNotFound { id: i64 },

    #[error("Campaign {id} is already running")]
    AlreadyRunning { id: i64 },

    #[error("Campaign {id} already finished ({status})")]
    AlreadyFinished { id: i64, status: String },

    #[error("Campaign {id} has no prompt selected")]
    MissingPrompt { id: i64 },

    #[error("Campaign {id} has no contacts to call")]
    NoContacts { id: i64 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

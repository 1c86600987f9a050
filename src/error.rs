/// Errors related to configuration loading and parsing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config at {path}: {message}")]
    ParseError {
        path: std::path::PathBuf,
        message: String,
    },
}

/// Request-time validation errors. Raised before an escalation record is
/// ever created, so a rejected request leaves no partial state behind.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Unrecognized trigger kind: `{0}`")]
    UnknownTrigger(String),

    #[error("Unrecognized page: `{0}`")]
    UnknownPage(String),

    #[error("Unrecognized collaboration mode: `{0}`")]
    UnknownMode(String),

    #[error("Trigger `{trigger}` on page `{page}` requires a non-empty page payload")]
    EmptyPayload { page: String, trigger: String },

    #[error("Delegation strategy is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("Primary worker `{worker}` also appears in the additional worker list")]
    PrimaryInAdditional { worker: String },
}

/// Errors surfaced by the escalation registry and status/cancel queries.
#[derive(Debug, thiserror::Error)]
pub enum EscalationError {
    #[error("Escalation not found: {0}")]
    NotFound(String),

    #[error("Escalation {id} is already in terminal state `{status}`")]
    InvalidState { id: String, status: String },
}

/// A crew invocation's own control logic failed (as opposed to the crew
/// returning a negative or low-confidence result).
#[derive(Debug, thiserror::Error)]
pub enum CrewError {
    #[error("No crew registered for worker id `{worker}`")]
    Unavailable { worker: String },

    #[error("Crew `{worker}` execution failed: {message}")]
    Execution { worker: String, message: String },
}

/// Failure within a specific delegation pattern's fan-out/join logic.
#[derive(Debug, thiserror::Error)]
pub enum DelegationError {
    #[error("Join failed in `{pattern}` delegation: {message}")]
    Join { pattern: String, message: String },
}

/// Failure in strategy-level orchestration of a collaborative escalation.
#[derive(Debug, thiserror::Error)]
pub enum CollaborationError {
    #[error("Failed to build enriched context: {0}")]
    ContextEnrichment(String),
}

/// Failed to persist a progress update. Surfaced to the caller but never
/// allowed to crash a running escalation.
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    #[error("Escalation not found: {0}")]
    NotFound(String),

    #[error("Escalation {id} is terminal (`{status}`); live fields are frozen")]
    Terminal { id: String, status: String },
}

use thiserror::Error;

use crate::models::Role;

/// A workflow or admin action refused before any state changed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("required field `{0}` is empty")]
    MissingField(&'static str),
    #[error("project report must be longer than {min} characters")]
    ReportTooShort { min: usize },
    #[error("submission needs at least one attachment as proof of work")]
    MissingEvidence,
    #[error("a justification is required for {0}")]
    MissingJustification(&'static str),
    #[error("sender has no department")]
    MissingDepartment,
    #[error("message is empty")]
    EmptyMessage,
    #[error("grading weights must sum to 100, got {total}")]
    UnbalancedWeights { total: u32 },
    #[error("unknown department `{0}`")]
    UnknownDepartment(String),
    #[error("department `{0}` already exists")]
    DepartmentExists(String),
    #[error("admin authorization key rejected")]
    InvalidAdminKey,
    #[error("identity `{0}` is not registered")]
    UnknownIdentity(String),
    #[error("{0} rating must be a number between 0 and 5")]
    RatingOutOfRange(&'static str),
    #[error("role {0} may not perform this action")]
    RoleNotPermitted(Role),
}

/// Login refusal. Every variant is also written to the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("core database empty, access rejected")]
    EmptyRegistry,
    #[error("access denied: invalid admin passkey")]
    InvalidAdminPasskey,
    #[error("access denied: level {0} not authorized for this identity")]
    RoleMismatch(Role),
    #[error("access denied: invalid passkey")]
    InvalidPasskey,
    #[error("access denied: unrecognized identity")]
    UnrecognizedIdentity,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("failed to encode state slice: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: {source}")]
    Row {
        row: usize,
        #[source]
        source: PolicyError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized {kind} `{value}`")]
pub struct ParseError {
    pub kind: &'static str,
    pub value: String,
}

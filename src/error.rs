use crate::role::Role;
use thiserror::Error;

/// Backend failure raised by a store implementation.
pub type BackendError = Box<dyn std::error::Error + Send + Sync>;

/// Failure raised by an external calendar or mail collaborator.
pub type PortError = Box<dyn std::error::Error + Send + Sync>;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by store implementations.
///
/// Lookups report absence through `Option`; `NotFound` is reserved for
/// mutations that target a row which does not exist.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The targeted row does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    /// A uniqueness constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(#[source] BackendError),
}

impl StoreError {
    /// Builds a `NotFound` error for an entity id.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Why an authorization check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The actor holds no membership in the group.
    NotMember,
    /// The actor's role is below the required level.
    InsufficientRole { required: Role, actual: Role },
    /// The membership lookup failed; authorization fails closed.
    StoreUnavailable,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotMember => f.write_str("not a member"),
            Self::InsufficientRole { .. } => f.write_str("insufficient permissions"),
            Self::StoreUnavailable => f.write_str("membership lookup failed"),
        }
    }
}

/// Errors returned by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// An entity id does not resolve.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    /// Authorization failure.
    #[error("denied: {0}")]
    Denied(DenyReason),
    /// Duplicate membership or a cross-group relationship mismatch.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Malformed input.
    #[error("invalid input: {0}")]
    Invalid(String),
    /// Store failure outside an authorization check.
    #[error("store error: {0}")]
    Store(#[source] BackendError),
    /// No tokio runtime available to host the background workers.
    #[error("runtime unavailable: {0}")]
    Runtime(#[from] tokio::runtime::TryCurrentError),
}

impl Error {
    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Denied(_) => "denied",
            Self::Conflict(_) => "conflict",
            Self::Invalid(_) => "invalid",
            Self::Store(_) => "store_unavailable",
            Self::Runtime(_) => "runtime_unavailable",
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<StoreError> for Error {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::Conflict(message) => Self::Conflict(message),
            StoreError::Backend(source) => Self::Store(source),
        }
    }
}

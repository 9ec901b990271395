use crate::apis::edge::ApiError;
use crate::client::ClientError;
use thiserror::Error;

/// RAUTA control plane errors
///
/// Configuration, lookup and unsupported errors are per-object: the caller
/// logs them and skips the object. Client errors abort the current pass.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported kind: {0}")]
    UnsupportedKind(String),

    #[error("{kind} {key} not found")]
    NotFound { kind: String, key: String },

    #[error("Lookup error: {0}")]
    Lookup(String),

    #[error("Unsupported configuration: {0}")]
    Unsupported(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Backing store error: {0}")]
    Client(#[from] ClientError),

    #[error("Remote edge API error: {0}")]
    Remote(#[from] ApiError),

    #[error("Finalizer error: {0}")]
    Finalizer(#[source] Box<kube::runtime::finalizer::Error<Error>>),

    #[error("Sync cancelled while waiting")]
    Cancelled,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Traffic policy error: {0}")]
    Policy(#[from] common::PolicyError),
}

impl Error {
    pub fn not_found(kind: impl ToString, key: impl ToString) -> Self {
        Error::NotFound {
            kind: kind.to_string(),
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound { .. } | Error::Client(ClientError::NotFound(_))
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Row store unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    #[error("Permission denied reading {table}")]
    PermissionDenied { table: String },

    #[error("Row store returned {status}: {message}")]
    Service { status: StatusCode, message: String },

    #[error("Malformed row payload: {0}")]
    Decode(String),

    #[error("Invalid table or column name: {0:?}")]
    InvalidIdentifier(String),

    #[error("Expected at most one row from {table}")]
    MultipleRows { table: String },
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Auth service unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    /// The token or credentials were rejected; the caller is simply not signed in.
    #[error("Credentials rejected")]
    Rejected,

    #[error("Auth service returned {status}: {message}")]
    Service { status: StatusCode, message: String },

    #[error("Malformed auth payload: {0}")]
    Decode(String),
}

impl AuthError {
    /// Whether the service itself is at fault, as opposed to the caller's credentials.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Unreachable(_) | Self::Decode(_) => true,
            Self::Service { status, .. } => status.is_server_error(),
            Self::Rejected => false,
        }
    }
}

use thiserror::Error;

/// Errors raised while building model values from untrusted input.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid alias (expected <namespace>:<value>): {0}")]
    InvalidAlias(String),

    #[error("Invalid host endpoint: {0}")]
    InvalidEndpoint(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

use thiserror::Error;

/// Top-level error taxonomy for the collector engine.
///
/// Component errors convert into this via explicit `From` impls at the
/// orchestrator boundary (never by matching on a message string). The
/// variant a `CollectorError` carries determines its HTTP status and its
/// effect on run status (see `orchestrator`).
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("input error: {0}")]
    Input(String),

    #[error("state conflict: {0}")]
    StateConflict(String),

    #[error("transient remote error: {0}")]
    TransientRemote(String),

    #[error("remote error: {0}")]
    Remote(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("fatal error: {0}")]
    Fatal(String),
}

impl CollectorError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, CollectorError::Fatal(_))
    }
}

pub type Result<T> = std::result::Result<T, CollectorError>;

impl From<crate::filter::FilterError> for CollectorError {
    fn from(err: crate::filter::FilterError) -> Self {
        CollectorError::Fatal(err.to_string())
    }
}

impl From<crate::fence::FenceError> for CollectorError {
    fn from(err: crate::fence::FenceError) -> Self {
        match err {
            crate::fence::FenceError::Corrupt(msg) => CollectorError::Fatal(msg),
            other => CollectorError::Fatal(other.to_string()),
        }
    }
}

impl From<crate::secret::SecretError> for CollectorError {
    fn from(err: crate::secret::SecretError) -> Self {
        CollectorError::Fatal(err.to_string())
    }
}

impl From<crate::gateway::GatewayError> for CollectorError {
    fn from(err: crate::gateway::GatewayError) -> Self {
        match err {
            crate::gateway::GatewayError::Transient(msg) => {
                CollectorError::TransientRemote(msg)
            }
            other => CollectorError::Remote(other.to_string()),
        }
    }
}

impl From<crate::imap::ImapError> for CollectorError {
    fn from(err: crate::imap::ImapError) -> Self {
        match err {
            crate::imap::ImapError::Transient(msg) => {
                CollectorError::TransientRemote(msg)
            }
            other => CollectorError::Remote(other.to_string()),
        }
    }
}

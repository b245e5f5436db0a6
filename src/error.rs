//! Error taxonomy for registrar operations.
//!
//! Every public operation returns [`Result`]. Callers can tell a transport
//! failure (the request never completed) apart from an API failure (the
//! registrar answered with an error envelope) and from local validation or
//! PDF extraction problems.

use thiserror::Error;

use crate::document::ExtractError;

/// Registrar client errors
#[derive(Error, Debug)]
pub enum RegistrarError {
    /// Connection failure, TLS failure, timeout, or a non-2xx status.
    #[error("transport error for {url}: {message}")]
    Transport {
        url: String,
        status: Option<u16>,
        message: String,
    },

    /// A caller-supplied argument is malformed.
    #[error("validation error: {0}")]
    Validation(String),

    /// The registrar answered, but the payload signals failure or is not
    /// the JSON the endpoint promises.
    #[error("API error: {0}")]
    Api(String),

    /// A downloaded PDF or page could not be turned into data. The cause is
    /// typed so callers can tell a missing table from an undecodable one.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractError),
}

/// Coarse classification of a [`RegistrarError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Validation,
    Api,
    Extraction,
}

impl RegistrarError {
    pub(crate) fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            status: None,
            message: message.into(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Which of the four failure classes this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Api(_) => ErrorKind::Api,
            Self::Extraction(_) => ErrorKind::Extraction,
        }
    }

    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    pub fn is_api(&self) -> bool {
        self.kind() == ErrorKind::Api
    }

    pub fn is_extraction(&self) -> bool {
        self.kind() == ErrorKind::Extraction
    }

    /// HTTP status, when the failure was a non-2xx response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RegistrarError>;

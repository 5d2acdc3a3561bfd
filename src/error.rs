use thiserror::Error;

/// Typed outcome of a single HTTP exchange with an archive.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("bad request (400)")]
    BadRequest,

    #[error("unauthorized ({0})")]
    Unauthorized(u16),

    #[error("not found (404)")]
    NotFound,

    #[error("server failure ({0})")]
    ServerFailure(u16),

    #[error("unexpected status {0}")]
    Unexpected(u16),

    #[error("invalid response body: {0}")]
    InvalidBody(String),
}

impl TransportError {
    /// Map an HTTP status to the typed outcome; `None` means success.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            200 => None,
            400 => Some(TransportError::BadRequest),
            401 | 403 => Some(TransportError::Unauthorized(status)),
            404 => Some(TransportError::NotFound),
            500 | 503 => Some(TransportError::ServerFailure(status)),
            other => Some(TransportError::Unexpected(other)),
        }
    }
}

/// Failures surfaced by repositories, the router and the sync engine.
#[derive(Debug, Error)]
pub enum PacsError {
    #[error("connection error: {0}")]
    Connection(#[from] TransportError),

    #[error("data error: {0}")]
    Data(String),

    #[error("could not delete destination study {existing}: {reason}")]
    ReplaceAborted { existing: String, reason: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("local index error: {0}")]
    Index(String),
}

impl PacsError {
    pub fn data(message: impl Into<String>) -> Self {
        PacsError::Data(message.into())
    }

    /// Network failures keep their kind; any status-level failure about a single
    /// entity becomes a data failure carrying `what`.
    pub fn from_transport(what: impl std::fmt::Display, err: TransportError) -> Self {
        match err {
            TransportError::Connection(_) => PacsError::Connection(err),
            other => PacsError::Data(format!("{what}: {other}")),
        }
    }
}

pub type Result<T, E = PacsError> = std::result::Result<T, E>;

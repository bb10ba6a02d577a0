//! Error types for osreport

use std::fmt;

/// Result type alias for osreport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for osreport
#[derive(Debug)]
pub enum Error {
    /// MySQL driver errors
    Database(mysql_async::Error),
    /// HTTP client errors
    Http(reqwest::Error),
    /// IO errors
    Io(std::io::Error),
    /// Serialization errors
    Serialization(String),
    /// Configuration errors
    Config(String),
    /// A relational store or identity service could not be reached
    SourceUnavailable(String),
    /// A series query failed or returned rows that could not be decoded
    Query { series: String, message: String },
    /// Identity service rejected a request or returned an unexpected body
    Identity(String),
    /// Ring file could not be loaded or does not describe the account
    Ring(String),
    /// Time-series sink rejected a write
    Sink(String),
    /// A chunk failed part way through a publish; earlier chunks stay written
    Publish {
        written: usize,
        total: usize,
        source: Box<Error>,
    },
    /// Timeout
    Timeout,
    /// Internal error
    Internal(String),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Database(e) => Some(e),
            Error::Http(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::Publish { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Database(e) => write!(f, "Database error: {}", e),
            Error::Http(e) => write!(f, "HTTP error: {}", e),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::SourceUnavailable(msg) => write!(f, "Source unavailable: {}", msg),
            Error::Query { series, message } => {
                write!(f, "Query for series '{}' failed: {}", series, message)
            }
            Error::Identity(msg) => write!(f, "Identity service error: {}", msg),
            Error::Ring(msg) => write!(f, "Ring error: {}", msg),
            Error::Sink(msg) => write!(f, "Sink error: {}", msg),
            Error::Publish {
                written,
                total,
                source,
            } => write!(
                f,
                "Publish failed after {} of {} points: {}",
                written, total, source
            ),
            Error::Timeout => write!(f, "Operation timed out"),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl Error {
    /// Whether this error means a collaborator could not be reached at all,
    /// as opposed to a failure scoped to one series or one request.
    pub fn is_source_unavailable(&self) -> bool {
        match self {
            Error::SourceUnavailable(_) => true,
            Error::Database(e) => matches!(e, mysql_async::Error::Io(_)),
            Error::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

impl From<mysql_async::Error> for Error {
    fn from(e: mysql_async::Error) -> Self {
        Error::Database(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Timeout
    }
}

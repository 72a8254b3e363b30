//! Error types
//!
//! `RequestError` ends a single request and always turns into a response.
//! `StartupError` ends the process.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Request result type
pub type RequestResult<T> = Result<T, RequestError>;

/// Everything that can go wrong while answering one request
#[derive(Debug, Error)]
pub enum RequestError {
    /// Malformed percent-encoding, invalid UTF-8 or an embedded NUL
    #[error("malformed request target: {0}")]
    Decode(String),
    /// Target resolves outside the server root
    #[error("path escapes the server root")]
    Forbidden,
    /// Target does not exist
    #[error("not found")]
    NotFound,
    /// Method other than GET or HEAD
    #[error("method {0} not allowed")]
    MethodNotAllowed(String),
    /// Any other filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl RequestError {
    /// HTTP status code for this error
    pub fn status(&self) -> u16 {
        match self {
            RequestError::Decode(_) => 400,
            RequestError::Forbidden => 403,
            RequestError::NotFound => 404,
            RequestError::MethodNotAllowed(_) => 405,
            RequestError::Io(_) => 500,
        }
    }

    /// Body sent to the client. Never carries paths or error details.
    pub fn status_text(&self) -> &'static str {
        match self {
            RequestError::Decode(_) => "400 Bad Request",
            RequestError::Forbidden => "403 Forbidden",
            RequestError::NotFound => "404 Not Found",
            RequestError::MethodNotAllowed(_) => "405 Method Not Allowed",
            RequestError::Io(_) => "500 Internal Server Error",
        }
    }

    /// Classify a stat/open failure
    pub fn from_stat(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => RequestError::NotFound,
            _ => RequestError::Io(e),
        }
    }
}

/// Process-fatal conditions
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Port {port} is already in use")]
    PortInUse { port: u16 },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("invalid PORT value: {0:?}")]
    InvalidPort(String),

    #[error("cannot serve {path}: {reason}")]
    InvalidRoot { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

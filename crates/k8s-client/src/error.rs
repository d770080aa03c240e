//! Kubernetes client errors
//!
//! Every failure carries a stable [`ErrorKind`] plus a human-readable message.
//! Server-reported failures keep the decoded `Status` when the response body
//! was one.

use crate::context::CancelReason;
use k8s_types::{Status, reason};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when talking to the Kubernetes API
#[derive(Debug, Error)]
pub enum Error {
    /// Kubeconfig is malformed or incomplete
    #[error("Invalid kubeconfig: {0}")]
    Config(String),

    /// Certificate or key material was rejected by the TLS stack
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    /// Local marshal/unmarshal failure
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Connection-level failure (refused, TLS handshake, timeout, DNS, body read)
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Server returned a non-success status
    #[error("Kubernetes API error: {0}")]
    Api(ApiError),

    /// Server reported that the resource does not exist
    #[error("Not found: {0}")]
    NotFound(ApiError),

    /// Server rejected a write because of a resource version mismatch
    #[error("Conflict: {0}")]
    Conflict(ApiError),

    /// Caller supplied arguments that cannot form a valid request
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Request context was canceled or its deadline passed
    #[error("Request canceled: {0}")]
    Canceled(CancelReason),

    /// Reading a kubeconfig or service account file failed
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        /// File that could not be read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Stable, machine-checkable error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// [`Error::Config`]
    Config,
    /// [`Error::TlsConfig`]
    TlsConfig,
    /// [`Error::Encoding`]
    Encoding,
    /// [`Error::Transport`]
    Transport,
    /// [`Error::Api`]
    Api,
    /// [`Error::NotFound`]
    NotFound,
    /// [`Error::Conflict`]
    Conflict,
    /// [`Error::InvalidArgument`]
    InvalidArgument,
    /// [`Error::Canceled`]
    Canceled,
    /// [`Error::Io`]
    Io,
}

/// Server-reported failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status code of the response
    pub code: u16,
    /// Decoded status document, if the body was one
    pub status: Option<Status>,
}

impl ApiError {
    /// Machine-readable reason from the status body
    pub fn reason(&self) -> Option<&str> {
        self.status.as_ref()?.reason.as_deref()
    }

    /// Human-readable message from the status body
    pub fn message(&self) -> Option<&str> {
        self.status.as_ref()?.message.as_deref()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            Some(status) => write!(f, "{}", status),
            None => write!(f, "HTTP status {}", self.code),
        }
    }
}

impl Error {
    /// Stable category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Config,
            Error::TlsConfig(_) => ErrorKind::TlsConfig,
            Error::Encoding(_) => ErrorKind::Encoding,
            Error::Transport(_) => ErrorKind::Transport,
            Error::Api(_) => ErrorKind::Api,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::Canceled(_) => ErrorKind::Canceled,
            Error::Io { .. } => ErrorKind::Io,
        }
    }

    /// Server-side details shared by `Api`, `NotFound` and `Conflict`
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Error::Api(e) | Error::NotFound(e) | Error::Conflict(e) => Some(e),
            _ => None,
        }
    }

    /// Whether the server reported a missing resource
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Whether the server rejected a stale resource version
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// Whether the server reported an existing resource on create
    pub fn is_already_exists(&self) -> bool {
        self.api_error()
            .is_some_and(|e| e.reason() == Some(reason::ALREADY_EXISTS))
    }

    /// Whether the caller's context ended the request
    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Canceled(_))
    }

    /// Classify a failed response
    ///
    /// The body is first decoded as a `Status`. Anything else (plain text
    /// from a proxy, HTML, empty bodies) degrades to an error carrying only
    /// the HTTP status code.
    pub fn from_response(code: u16, body: &[u8]) -> Self {
        let status = serde_json::from_slice::<Status>(body)
            .ok()
            .filter(Status::looks_like_status);
        Self::from_api_error(ApiError { code, status })
    }

    /// Classify a status produced locally (e.g., by the mock client)
    pub fn from_status(status: Status) -> Self {
        let code = status.code.unwrap_or(500);
        Self::from_api_error(ApiError {
            code,
            status: Some(status),
        })
    }

    fn from_api_error(err: ApiError) -> Self {
        match err.code {
            404 => Error::NotFound(err),
            409 if err.reason() != Some(reason::ALREADY_EXISTS) => Error::Conflict(err),
            _ => Error::Api(err),
        }
    }

    pub(crate) fn encoding(context: &str, err: impl fmt::Display) -> Self {
        Error::Encoding(format!("{}: {}", context, err))
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_body_is_decoded() {
        let body = br#"{"kind":"Status","apiVersion":"v1","status":"Failure","message":"configmaps \"abc123\" not found","reason":"NotFound","code":404}"#;
        let err = Error::from_response(404, body);

        assert_eq!(err.kind(), ErrorKind::NotFound);
        let api = err.api_error().expect("api error");
        assert_eq!(api.code, 404);
        assert_eq!(api.reason(), Some("NotFound"));
        assert_eq!(api.message(), Some("configmaps \"abc123\" not found"));
    }

    #[test]
    fn test_plain_text_body_degrades_to_code_only() {
        let err = Error::from_response(502, b"502 Bad Gateway\n<html>proxy error</html>");

        assert_eq!(err.kind(), ErrorKind::Api);
        let api = err.api_error().expect("api error");
        assert_eq!(api.code, 502);
        assert!(api.status.is_none());
        assert_eq!(err.to_string(), "Kubernetes API error: HTTP status 502");
    }

    #[test]
    fn test_json_that_is_not_a_status_degrades() {
        let err = Error::from_response(500, br#"{"error": 1}"#);
        assert!(err.api_error().expect("api error").status.is_none());
    }

    #[test]
    fn test_plain_404_is_still_not_found() {
        let err = Error::from_response(404, b"404 page not found");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_conflict_versus_already_exists() {
        let conflict = Error::from_status(Status::failure(409, reason::CONFLICT, "the object has been modified"));
        assert!(conflict.is_conflict());

        let exists = Error::from_status(Status::failure(409, reason::ALREADY_EXISTS, "already exists"));
        assert_eq!(exists.kind(), ErrorKind::Api);
        assert!(exists.is_already_exists());
        assert!(!exists.is_conflict());
    }

    #[test]
    fn test_canceled_is_distinct() {
        let err = Error::Canceled(CancelReason::Canceled);
        assert!(err.is_canceled());
        assert!(err.api_error().is_none());
        assert_eq!(err.kind(), ErrorKind::Canceled);
    }
}

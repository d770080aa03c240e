//! API status documents
//!
//! The server answers failed requests (and some deletes) with a `Status`
//! object. The client also builds one locally to report watch frames it could
//! not decode.

use crate::meta::ListMeta;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Well-known `Status.reason` values
pub mod reason {
    /// Resource does not exist
    pub const NOT_FOUND: &str = "NotFound";
    /// Resource with the same name already exists
    pub const ALREADY_EXISTS: &str = "AlreadyExists";
    /// Write rejected because of a resource version mismatch
    pub const CONFLICT: &str = "Conflict";
    /// Request was malformed or failed validation
    pub const INVALID: &str = "Invalid";
    /// Request was not authenticated
    pub const UNAUTHORIZED: &str = "Unauthorized";
    /// Request was authenticated but not allowed
    pub const FORBIDDEN: &str = "Forbidden";
    /// Resource version is too old to serve (watch restarts)
    pub const EXPIRED: &str = "Expired";
    /// Watch frame could not be decoded by the client
    pub const DECODE_FAILURE: &str = "DecodeFailure";
}

/// `Status.status` value of failed requests
pub const STATUS_FAILURE: &str = "Failure";

/// `Status.status` value of successful requests
pub const STATUS_SUCCESS: &str = "Success";

/// Server error response shape
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// Always "v1" when set by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Always "Status" when set by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// List metadata (unused by most responses)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ListMeta>,

    /// "Success" or "Failure"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Machine-readable reason (see [`reason`])
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Extended data associated with the reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<StatusDetails>,

    /// HTTP status code for this status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

/// Structured cause details of a `Status`
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusDetails {
    /// Name of the affected resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// API group of the affected resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Kind (plural resource) of the affected resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// UID of the affected resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    /// Individual causes (e.g., per-field validation errors)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causes: Option<Vec<StatusCause>>,

    /// Suggested client back-off
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u32>,
}

/// Single cause of a failure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusCause {
    /// Machine-readable cause
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable cause
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Field path the cause refers to (e.g., "metadata.name")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl Status {
    /// Failure status with the given code, reason and message
    pub fn failure(code: u16, reason: &str, message: impl Into<String>) -> Self {
        Self {
            api_version: Some("v1".to_string()),
            kind: Some("Status".to_string()),
            metadata: None,
            status: Some(STATUS_FAILURE.to_string()),
            message: Some(message.into()),
            reason: Some(reason.to_string()),
            details: None,
            code: Some(code),
        }
    }

    /// 404 as the API server reports it for `plural`/`name`
    pub fn not_found(plural: &str, name: &str) -> Self {
        Self::failure(404, reason::NOT_FOUND, format!("{} \"{}\" not found", plural, name))
            .with_details(plural, name)
    }

    /// 409 returned by create when the name is taken
    pub fn already_exists(plural: &str, name: &str) -> Self {
        Self::failure(409, reason::ALREADY_EXISTS, format!("{} \"{}\" already exists", plural, name))
            .with_details(plural, name)
    }

    /// 409 returned by update when the resource version is stale
    pub fn conflict(plural: &str, name: &str) -> Self {
        Self::failure(
            409,
            reason::CONFLICT,
            format!(
                "Operation cannot be fulfilled on {} \"{}\": the object has been modified; please apply your changes to the latest version and try again",
                plural, name
            ),
        )
        .with_details(plural, name)
    }

    fn with_details(mut self, plural: &str, name: &str) -> Self {
        self.details = Some(StatusDetails {
            name: Some(name.to_string()),
            kind: Some(plural.to_string()),
            ..Default::default()
        });
        self
    }

    /// Status describing a watch frame the client could not decode
    pub fn decode_failure(message: impl Into<String>) -> Self {
        Self::failure(500, reason::DECODE_FAILURE, message)
    }

    /// Whether this status was produced locally for an undecodable watch frame
    pub fn is_decode_failure(&self) -> bool {
        self.reason.as_deref() == Some(reason::DECODE_FAILURE)
    }

    /// Whether a decoded body actually is a status document
    ///
    /// Every field is optional, so any JSON object deserializes into a
    /// `Status`. Only bodies that identify themselves as one, or at least
    /// carry a reason or message, are trusted.
    pub fn looks_like_status(&self) -> bool {
        self.kind.as_deref() == Some("Status") || self.reason.is_some() || self.message.is_some()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = self.reason.as_deref().unwrap_or("Unknown");
        match (&self.message, self.code) {
            (Some(message), Some(code)) => write!(f, "{} ({}): {}", reason, code, message),
            (Some(message), None) => write!(f, "{}: {}", reason, message),
            (None, Some(code)) => write!(f, "{} ({})", reason, code),
            (None, None) => f.write_str(reason),
        }
    }
}

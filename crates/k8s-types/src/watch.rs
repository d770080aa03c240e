//! Watch events
//!
//! Wire form is one `{"type": "...", "object": {...}}` document per frame.

use crate::status::Status;
use serde::{Deserialize, Serialize};

/// Change notification delivered by a watch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "object")]
pub enum WatchEvent<K> {
    /// Object was created (or existed when the watch started)
    #[serde(rename = "ADDED")]
    Added(K),

    /// Object was changed
    #[serde(rename = "MODIFIED")]
    Modified(K),

    /// Object was removed
    #[serde(rename = "DELETED")]
    Deleted(K),

    /// Server-side watch error or a frame the client could not decode
    #[serde(rename = "ERROR")]
    Error(Status),
}

impl<K> WatchEvent<K> {
    /// Wire name of the event type
    pub fn type_name(&self) -> &'static str {
        match self {
            WatchEvent::Added(_) => "ADDED",
            WatchEvent::Modified(_) => "MODIFIED",
            WatchEvent::Deleted(_) => "DELETED",
            WatchEvent::Error(_) => "ERROR",
        }
    }

    /// The affected object, unless this is an error event
    pub fn object(&self) -> Option<&K> {
        match self {
            WatchEvent::Added(obj) | WatchEvent::Modified(obj) | WatchEvent::Deleted(obj) => Some(obj),
            WatchEvent::Error(_) => None,
        }
    }

    /// Whether this is an `ERROR` event
    pub fn is_error(&self) -> bool {
        matches!(self, WatchEvent::Error(_))
    }
}

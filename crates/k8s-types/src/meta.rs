//! Object and list metadata
//!
//! Every field is optional: an absent field stays absent across a
//! serialize/deserialize round trip and is never replaced by a zero value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// apiVersion/kind pair carried by every top-level object
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypeMeta {
    /// API group and version (e.g., "v1", "apps/v1")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Object kind (e.g., "ConfigMap")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Standard object metadata (`metadata` of every persisted resource)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Object name, unique within its namespace and kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Prefix the server uses to generate a name when `name` is unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_name: Option<String>,

    /// Namespace (unset for cluster-scoped kinds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Server-assigned unique identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    /// Opaque version token used for optimistic concurrency
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,

    /// Sequence number of the desired state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<i64>,

    /// Server timestamp of creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,

    /// Set once graceful deletion has been requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,

    /// Identifying key/value pairs, matched by label selectors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    /// Non-identifying key/value pairs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl ObjectMeta {
    /// Metadata with only a name set
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Metadata with name and namespace set
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            namespace: Some(namespace.into()),
            ..Default::default()
        }
    }

    /// Builder-style label insertion
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Label value lookup that treats missing labels and a missing map alike
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.as_ref()?.get(key).map(String::as_str)
    }
}

/// Metadata of list responses
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ListMeta {
    /// Version of the collection at the time of the list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,

    /// Continuation token for paginated lists
    #[serde(default, rename = "continue", skip_serializing_if = "Option::is_none")]
    pub continue_token: Option<String>,

    /// Estimated number of items not yet returned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_item_count: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_fields_stay_unset_after_round_trip() {
        let meta = ObjectMeta::namespaced("default", "abc123").with_label("testLabel", "xyz789");

        let json = serde_json::to_string(&meta).expect("serialize");
        assert!(!json.contains("resourceVersion"));
        assert!(!json.contains("annotations"));

        let decoded: ObjectMeta = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(decoded, meta);
        assert_eq!(decoded.resource_version, None);
        assert_eq!(decoded.annotations, None);
        assert_eq!(decoded.label("testLabel"), Some("xyz789"));
    }

    #[test]
    fn test_empty_string_is_not_absent() {
        let meta = ObjectMeta {
            name: Some(String::new()),
            ..Default::default()
        };

        let json = serde_json::to_string(&meta).expect("serialize");
        assert_eq!(json, r#"{"name":""}"#);

        let decoded: ObjectMeta = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(decoded.name, Some(String::new()));
        assert_eq!(decoded.namespace, None);
    }

    #[test]
    fn test_server_fields_decode() {
        let decoded: ObjectMeta = serde_json::from_str(
            r#"{
                "name": "node-1",
                "uid": "6f1d4c1e-0000-4000-8000-000000000001",
                "resourceVersion": "4711",
                "generation": 3,
                "creationTimestamp": "2024-01-01T00:00:00Z"
            }"#,
        )
        .expect("deserialize");

        assert_eq!(decoded.resource_version.as_deref(), Some("4711"));
        assert_eq!(decoded.generation, Some(3));
        assert!(decoded.creation_timestamp.is_some());
        assert_eq!(decoded.labels, None);
    }

    #[test]
    fn test_list_meta_continue_rename() {
        let decoded: ListMeta =
            serde_json::from_str(r#"{"resourceVersion":"10","continue":"abc"}"#).expect("deserialize");
        assert_eq!(decoded.continue_token.as_deref(), Some("abc"));

        let json = serde_json::to_value(&decoded).expect("serialize");
        assert_eq!(json["continue"], "abc");
    }
}

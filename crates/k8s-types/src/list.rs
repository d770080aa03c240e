//! List response wrapper

use crate::meta::ListMeta;
use serde::{Deserialize, Deserializer, Serialize};

/// Kubernetes list response (`items` plus list metadata)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
pub struct ObjectList<T> {
    /// e.g. "v1"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// e.g. "ConfigMapList"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Collection resource version and continuation token
    #[serde(default)]
    pub metadata: ListMeta,

    /// Items in server order; `null` and a missing field both decode as empty
    #[serde(default = "Vec::new", deserialize_with = "null_as_empty")]
    pub items: Vec<T>,
}

impl<T> Default for ObjectList<T> {
    fn default() -> Self {
        Self {
            api_version: None,
            kind: None,
            metadata: ListMeta::default(),
            items: Vec::new(),
        }
    }
}

impl<T> ObjectList<T> {
    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list holds no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Continuation token for the next page, if the server returned one
    pub fn continue_token(&self) -> Option<&str> {
        self.metadata
            .continue_token
            .as_deref()
            .filter(|token| !token.is_empty())
    }

    /// Iterate items
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T> IntoIterator for ObjectList<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConfigMap;

    #[test]
    fn test_null_items_decode_as_empty() {
        let list: ObjectList<ConfigMap> =
            serde_json::from_str(r#"{"kind":"ConfigMapList","metadata":{"resourceVersion":"7"},"items":null}"#)
                .expect("deserialize");
        assert!(list.is_empty());
        assert_eq!(list.metadata.resource_version.as_deref(), Some("7"));
    }

    #[test]
    fn test_missing_items_decode_as_empty() {
        let list: ObjectList<ConfigMap> = serde_json::from_str(r#"{"metadata":{}}"#).expect("deserialize");
        assert_eq!(list.len(), 0);
        assert_eq!(list.continue_token(), None);
    }

    #[test]
    fn test_items_keep_server_order() {
        let list: ObjectList<ConfigMap> = serde_json::from_str(
            r#"{"metadata":{"continue":"next-page"},"items":[
                {"metadata":{"name":"b"}},
                {"metadata":{"name":"a"}}
            ]}"#,
        )
        .expect("deserialize");

        let names: Vec<_> = list.iter().filter_map(|cm| cm.metadata.name.clone()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(list.continue_token(), Some("next-page"));
    }
}

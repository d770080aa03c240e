//! Untyped objects
//!
//! `DynamicObject` lets callers push any kind through the generic client
//! without a schema: metadata is typed, everything else stays JSON.

use crate::meta::ObjectMeta;
use crate::resource::Resource;
use serde::{Deserialize, Serialize};

/// Object of any kind
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DynamicObject {
    /// apiVersion of the object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Kind of the object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,

    /// All remaining top-level fields (spec, data, status, ...)
    #[serde(flatten)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl Resource for DynamicObject {
    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

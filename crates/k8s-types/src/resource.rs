//! Resource accessor contract
//!
//! The generic client never interprets domain fields. It only needs to read
//! and write the object metadata, which every payload type exposes through
//! `Resource`. Kinds with a fixed REST location also implement
//! `ResourceKind` so their URL template can be derived statically.

use crate::meta::ObjectMeta;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// A payload the generic client can send and receive
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Object metadata
    fn metadata(&self) -> &ObjectMeta;

    /// Mutable object metadata
    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    /// Object name, if set
    fn name(&self) -> Option<&str> {
        self.metadata().name.as_deref()
    }

    /// Object namespace, if set
    fn namespace(&self) -> Option<&str> {
        self.metadata().namespace.as_deref()
    }

    /// Resource version, if set
    fn resource_version(&self) -> Option<&str> {
        self.metadata().resource_version.as_deref()
    }
}

/// Static REST location of a resource kind
pub trait ResourceKind: Resource {
    /// apiVersion (e.g., "v1", "apps/v1")
    const API_VERSION: &'static str;

    /// Kind name (e.g., "ConfigMap")
    const KIND: &'static str;

    /// Lower-case plural used in URLs (e.g., "configmaps")
    const PLURAL: &'static str;

    /// Whether instances live inside a namespace
    const NAMESPACED: bool;
}

/// API root for an apiVersion: core group under `/api`, named groups under `/apis`
pub fn api_root(api_version: &str) -> String {
    if api_version.contains('/') {
        format!("/apis/{}", api_version)
    } else {
        format!("/api/{}", api_version)
    }
}

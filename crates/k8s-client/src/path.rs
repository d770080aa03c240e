//! Resource addressing
//!
//! A [`KindPath`] carries everything needed to build a URL for a kind: its
//! API root (`/api/v1` or `/apis/{group}/{version}`), plural name and scope.

use crate::error::Error;
use k8s_types::{Resource, ResourceKind, api_root};

/// Routing information for one resource kind
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KindPath {
    api_version: String,
    kind: Option<String>,
    plural: String,
    namespaced: bool,
}

impl KindPath {
    /// Path for a statically known kind
    pub fn of<K: ResourceKind>() -> Self {
        Self {
            api_version: K::API_VERSION.to_string(),
            kind: Some(K::KIND.to_string()),
            plural: K::PLURAL.to_string(),
            namespaced: K::NAMESPACED,
        }
    }

    /// Path for a namespaced kind known only at runtime
    pub fn namespaced(api_version: impl Into<String>, plural: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            kind: None,
            plural: plural.into(),
            namespaced: true,
        }
    }

    /// Path for a cluster-scoped kind known only at runtime
    pub fn cluster_scoped(api_version: impl Into<String>, plural: impl Into<String>) -> Self {
        Self {
            namespaced: false,
            ..Self::namespaced(api_version, plural)
        }
    }

    /// Kind name stamped into request bodies that lack one
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// apiVersion, e.g. `v1` or `apps/v1`
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Kind name, when known
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    /// Lower-case plural used in URLs
    pub fn plural(&self) -> &str {
        &self.plural
    }

    /// Whether objects of this kind live in a namespace
    pub fn is_namespaced(&self) -> bool {
        self.namespaced
    }

    /// `/api/v1` or `/apis/{group}/{version}`
    pub fn api_root(&self) -> String {
        api_root(&self.api_version)
    }

    /// Collection URL path; `None` addresses every namespace (or a cluster-scoped kind)
    pub fn collection_path(&self, namespace: Option<&str>) -> String {
        match namespace {
            Some(ns) => format!(
                "{}/namespaces/{}/{}",
                self.api_root(),
                urlencoding::encode(ns),
                self.plural
            ),
            None => format!("{}/{}", self.api_root(), self.plural),
        }
    }

    /// Item URL path
    pub fn item_path(&self, namespace: Option<&str>, name: &str) -> String {
        format!(
            "{}/{}",
            self.collection_path(namespace),
            urlencoding::encode(name)
        )
    }

    /// Validate the scope of a single-object request
    ///
    /// Namespaced kinds need a namespace, cluster-scoped kinds must not have one.
    pub fn item_scope<'a>(&self, namespace: &'a str, name: &str) -> Result<Option<&'a str>, Error> {
        if name.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "{}: name must not be empty",
                self.plural
            )));
        }
        match (self.namespaced, namespace.is_empty()) {
            (true, true) => Err(Error::InvalidArgument(format!(
                "{} is namespaced: namespace must not be empty",
                self.plural
            ))),
            (true, false) => Ok(Some(namespace)),
            (false, true) => Ok(None),
            (false, false) => Err(cluster_scoped_with_namespace(&self.plural, namespace)),
        }
    }

    /// Validate the scope of a list or watch
    ///
    /// An empty namespace on a namespaced kind spans all namespaces.
    pub fn collection_scope<'a>(&self, namespace: &'a str) -> Result<Option<&'a str>, Error> {
        match (self.namespaced, namespace.is_empty()) {
            (_, true) => Ok(None),
            (true, false) => Ok(Some(namespace)),
            (false, false) => Err(cluster_scoped_with_namespace(&self.plural, namespace)),
        }
    }

    /// Namespace a create request is sent to
    ///
    /// Payload metadata wins, then `default_namespace`.
    pub fn create_scope<'a, K: Resource>(
        &self,
        payload: &'a K,
        default_namespace: &'a str,
    ) -> Result<Option<&'a str>, Error> {
        let namespace = payload.namespace().filter(|ns| !ns.is_empty());
        if !self.namespaced {
            return match namespace {
                Some(ns) => Err(cluster_scoped_with_namespace(&self.plural, ns)),
                None => Ok(None),
            };
        }
        match namespace.or(Some(default_namespace).filter(|ns| !ns.is_empty())) {
            Some(ns) => Ok(Some(ns)),
            None => Err(Error::InvalidArgument(format!(
                "{} is namespaced: no namespace in metadata and no default namespace",
                self.plural
            ))),
        }
    }

    /// Namespace and name an update is addressed to, taken from payload metadata
    pub fn update_target<'a, K: Resource>(
        &self,
        payload: &'a K,
    ) -> Result<(Option<&'a str>, &'a str), Error> {
        let name = payload.name().filter(|n| !n.is_empty()).ok_or_else(|| {
            Error::InvalidArgument(format!("{}: metadata.name must be set to update", self.plural))
        })?;
        let namespace = payload.namespace().unwrap_or_default();
        if self.namespaced && namespace.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "{}: metadata.namespace must be set to update",
                self.plural
            )));
        }
        Ok((self.item_scope(namespace, name)?, name))
    }

    /// Serialize a payload, stamping `apiVersion`/`kind` when missing
    pub fn encode_payload<K: Resource>(&self, payload: &K) -> Result<serde_json::Value, Error> {
        let mut value = serde_json::to_value(payload)
            .map_err(|e| Error::encoding("failed to encode request body", e))?;
        let object = value
            .as_object_mut()
            .ok_or_else(|| Error::Encoding("request body is not a JSON object".to_string()))?;
        if !has_string(object, "apiVersion") {
            object.insert("apiVersion".into(), self.api_version.clone().into());
        }
        if let Some(kind) = &self.kind {
            if !has_string(object, "kind") {
                object.insert("kind".into(), kind.clone().into());
            }
        }
        Ok(value)
    }
}

fn has_string(object: &serde_json::Map<String, serde_json::Value>, key: &str) -> bool {
    object
        .get(key)
        .and_then(|v| v.as_str())
        .is_some_and(|s| !s.is_empty())
}

fn cluster_scoped_with_namespace(plural: &str, namespace: &str) -> Error {
    Error::InvalidArgument(format!(
        "{} is cluster-scoped: namespace {:?} is not allowed",
        plural, namespace
    ))
}

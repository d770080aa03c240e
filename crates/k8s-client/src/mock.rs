//! Mock KubeClient for unit testing
//!
//! An in-memory API server behind [`KubeClientTrait`]. It assigns `uid`,
//! `creationTimestamp` and a monotonically increasing `resourceVersion`,
//! enforces name uniqueness and optimistic concurrency, and reports failures
//! with the same [`Error`] values the HTTP client produces. Watches replay the
//! recorded event log through the real watch decoder.

use crate::client_trait::KubeClientTrait;
use crate::config::DEFAULT_NAMESPACE;
use crate::context::RequestContext;
use crate::error::Error;
use crate::params::{DeleteOptions, ListOptions};
use crate::path::KindPath;
use crate::selector::{FieldSelector, LabelSelector};
use crate::watch::{ChunkSource, WatchStream};
use bytes::Bytes;
use k8s_types::{ListMeta, ObjectList, Resource, Status};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ObjectKey {
    collection: String,
    namespace: String,
    name: String,
}

#[derive(Debug, Clone)]
struct RecordedEvent {
    collection: String,
    namespace: String,
    resource_version: u64,
    event_type: &'static str,
    object: Value,
}

#[derive(Debug, Default)]
struct MockStore {
    objects: BTreeMap<ObjectKey, Value>,
    events: Vec<RecordedEvent>,
    resource_version: u64,
}

impl MockStore {
    fn next_resource_version(&mut self) -> u64 {
        self.resource_version += 1;
        self.resource_version
    }

    fn record(&mut self, key: &ObjectKey, event_type: &'static str, object: &Value, resource_version: u64) {
        self.events.push(RecordedEvent {
            collection: key.collection.clone(),
            namespace: key.namespace.clone(),
            resource_version,
            event_type,
            object: object.clone(),
        });
    }
}

/// Mock KubeClient for testing
#[derive(Clone, Debug)]
pub struct MockKubeClient {
    default_namespace: String,
    store: Arc<Mutex<MockStore>>,
    /// One-shot failures keyed by verb name
    failures: Arc<Mutex<HashMap<&'static str, Status>>>,
}

impl Default for MockKubeClient {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl MockKubeClient {
    /// Create an empty mock with the given default namespace
    pub fn new(default_namespace: impl Into<String>) -> Self {
        Self {
            default_namespace: default_namespace.into(),
            store: Arc::new(Mutex::new(MockStore::default())),
            failures: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Make the next call of `verb` fail with `status`
    pub fn fail_next(&self, verb: &'static str, status: Status) {
        lock(&self.failures).insert(verb, status);
    }

    /// Number of stored objects across all kinds
    pub fn object_count(&self) -> usize {
        lock(&self.store).objects.len()
    }

    /// Current collection resource version
    pub fn resource_version(&self) -> u64 {
        lock(&self.store).resource_version
    }

    fn check(&self, ctx: &RequestContext, verb: &'static str) -> Result<(), Error> {
        if let Some(reason) = ctx.err() {
            return Err(Error::Canceled(reason));
        }
        match lock(&self.failures).remove(verb) {
            Some(status) => Err(Error::from_status(status)),
            None => Ok(()),
        }
    }

    fn key(kind: &KindPath, namespace: Option<&str>, name: &str) -> ObjectKey {
        ObjectKey {
            collection: kind.collection_path(None),
            namespace: namespace.unwrap_or_default().to_string(),
            name: name.to_string(),
        }
    }

    fn create_value(&self, kind: &KindPath, namespace: Option<&str>, mut body: Value) -> Result<Value, Error> {
        let mut store = lock(&self.store);
        let name = match body.pointer("/metadata/name").and_then(Value::as_str) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => match body.pointer("/metadata/generateName").and_then(Value::as_str) {
                Some(prefix) if !prefix.is_empty() => {
                    format!("{}{}", prefix, &uuid::Uuid::new_v4().simple().to_string()[..5])
                }
                _ => {
                    return Err(Error::from_status(Status::failure(
                        422,
                        k8s_types::reason::INVALID,
                        format!("{}: metadata.name: Required value", kind.plural()),
                    )));
                }
            },
        };
        let key = Self::key(kind, namespace, &name);
        if store.objects.contains_key(&key) {
            return Err(Error::from_status(Status::already_exists(kind.plural(), &name)));
        }

        let resource_version = store.next_resource_version();
        let metadata = metadata_mut(&mut body)?;
        metadata.insert("name".into(), name.into());
        if let Some(ns) = namespace {
            metadata.insert("namespace".into(), ns.into());
        }
        metadata.insert("uid".into(), uuid::Uuid::new_v4().to_string().into());
        metadata.insert(
            "creationTimestamp".into(),
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string().into(),
        );
        metadata.insert("resourceVersion".into(), resource_version.to_string().into());

        store.record(&key, "ADDED", &body, resource_version);
        store.objects.insert(key, body.clone());
        Ok(body)
    }

    fn update_value(&self, kind: &KindPath, namespace: Option<&str>, name: &str, mut body: Value) -> Result<Value, Error> {
        let mut store = lock(&self.store);
        let key = Self::key(kind, namespace, name);
        let Some(stored) = store.objects.get(&key) else {
            return Err(Error::from_status(Status::not_found(kind.plural(), name)));
        };

        let stored_version = stored.pointer("/metadata/resourceVersion").cloned();
        let sent_version = body.pointer("/metadata/resourceVersion").and_then(Value::as_str);
        if sent_version.is_some_and(|v| !v.is_empty() && Some(v) != stored_version.as_ref().and_then(Value::as_str)) {
            return Err(Error::from_status(Status::conflict(kind.plural(), name)));
        }
        let uid = stored.pointer("/metadata/uid").cloned();
        let created = stored.pointer("/metadata/creationTimestamp").cloned();

        let resource_version = store.next_resource_version();
        let metadata = metadata_mut(&mut body)?;
        if let Some(uid) = uid {
            metadata.insert("uid".into(), uid);
        }
        if let Some(created) = created {
            metadata.insert("creationTimestamp".into(), created);
        }
        metadata.insert("resourceVersion".into(), resource_version.to_string().into());

        store.record(&key, "MODIFIED", &body, resource_version);
        store.objects.insert(key, body.clone());
        Ok(body)
    }

    fn delete_value(&self, kind: &KindPath, namespace: Option<&str>, name: &str, options: &DeleteOptions) -> Result<(), Error> {
        let mut store = lock(&self.store);
        let key = Self::key(kind, namespace, name);
        let Some(stored) = store.objects.get(&key) else {
            return Err(Error::from_status(Status::not_found(kind.plural(), name)));
        };
        if let Some(preconditions) = &options.preconditions {
            for (field, wanted) in [
                ("resourceVersion", &preconditions.resource_version),
                ("uid", &preconditions.uid),
            ] {
                let Some(wanted) = wanted else { continue };
                let actual = stored
                    .pointer(&format!("/metadata/{}", field))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if actual != wanted {
                    return Err(Error::from_status(Status::failure(
                        409,
                        k8s_types::reason::CONFLICT,
                        format!(
                            "Precondition failed: {} in precondition: {}, {} in object meta: {}",
                            field, wanted, field, actual
                        ),
                    )));
                }
            }
        }

        let Some(mut object) = store.objects.remove(&key) else {
            return Err(Error::from_status(Status::not_found(kind.plural(), name)));
        };
        let resource_version = store.next_resource_version();
        if let Ok(metadata) = metadata_mut(&mut object) {
            metadata.insert("resourceVersion".into(), resource_version.to_string().into());
        }
        store.record(&key, "DELETED", &object, resource_version);
        Ok(())
    }

    fn list_values(&self, kind: &KindPath, namespace: Option<&str>, options: &ListOptions) -> Result<(Vec<Value>, u64), Error> {
        let filter = Filter::new(options)?;
        let collection = kind.collection_path(None);
        let store = lock(&self.store);
        let items = store
            .objects
            .iter()
            .filter(|(key, _)| key.collection == collection)
            .filter(|(key, _)| namespace.is_none_or(|ns| key.namespace == ns))
            .filter(|(_, object)| filter.matches(object))
            .map(|(_, object)| object.clone())
            .collect();
        Ok((items, store.resource_version))
    }

    fn watch_frames(&self, kind: &KindPath, namespace: Option<&str>, options: &ListOptions) -> Result<Vec<Bytes>, Error> {
        let filter = Filter::new(options)?;
        let since = options
            .resource_version
            .as_deref()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        let collection = kind.collection_path(None);
        let store = lock(&self.store);
        let mut frames = Vec::new();
        for event in &store.events {
            if event.collection != collection
                || event.resource_version <= since
                || namespace.is_some_and(|ns| event.namespace != ns)
                || !filter.matches(&event.object)
            {
                continue;
            }
            let frame = serde_json::json!({"type": event.event_type, "object": event.object});
            let mut line = serde_json::to_vec(&frame).map_err(|e| Error::encoding("failed to encode watch event", e))?;
            line.push(b'\n');
            frames.push(Bytes::from(line));
        }
        Ok(frames)
    }
}

struct Filter {
    labels: LabelSelector,
    fields: FieldSelector,
}

impl Filter {
    fn new(options: &ListOptions) -> Result<Self, Error> {
        Ok(Self {
            labels: options.label_selector.as_deref().unwrap_or_default().parse()?,
            fields: options.field_selector.as_deref().unwrap_or_default().parse()?,
        })
    }

    fn matches(&self, object: &Value) -> bool {
        let labels: BTreeMap<String, String> = object
            .pointer("/metadata/labels")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        self.labels.matches(&labels) && self.fields.matches(object)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn metadata_mut(body: &mut Value) -> Result<&mut serde_json::Map<String, Value>, Error> {
    let object = body
        .as_object_mut()
        .ok_or_else(|| Error::Encoding("payload is not a JSON object".to_string()))?;
    let metadata = object
        .entry("metadata")
        .or_insert_with(|| Value::Object(serde_json::Map::new()));
    if metadata.is_null() {
        *metadata = Value::Object(serde_json::Map::new());
    }
    metadata
        .as_object_mut()
        .ok_or_else(|| Error::Encoding("metadata is not a JSON object".to_string()))
}

fn decode<K: Resource>(value: Value) -> Result<K, Error> {
    serde_json::from_value(value).map_err(|e| Error::encoding("failed to decode stored object", e))
}

#[async_trait::async_trait]
impl KubeClientTrait for MockKubeClient {
    fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    async fn create<K: Resource>(&self, ctx: &RequestContext, kind: &KindPath, payload: &K) -> Result<K, Error> {
        self.check(ctx, "create")?;
        let namespace = kind.create_scope(payload, &self.default_namespace)?;
        let body = kind.encode_payload(payload)?;
        decode(self.create_value(kind, namespace, body)?)
    }

    async fn get<K: Resource>(&self, ctx: &RequestContext, kind: &KindPath, namespace: &str, name: &str) -> Result<K, Error> {
        self.check(ctx, "get")?;
        let namespace = kind.item_scope(namespace, name)?;
        let stored = lock(&self.store)
            .objects
            .get(&Self::key(kind, namespace, name))
            .cloned();
        match stored {
            Some(value) => decode(value),
            None => Err(Error::from_status(Status::not_found(kind.plural(), name))),
        }
    }

    async fn update<K: Resource>(&self, ctx: &RequestContext, kind: &KindPath, payload: &K) -> Result<K, Error> {
        self.check(ctx, "update")?;
        let (namespace, name) = kind.update_target(payload)?;
        let body = kind.encode_payload(payload)?;
        decode(self.update_value(kind, namespace, name, body)?)
    }

    async fn delete_with(
        &self,
        ctx: &RequestContext,
        kind: &KindPath,
        namespace: &str,
        name: &str,
        options: &DeleteOptions,
    ) -> Result<(), Error> {
        self.check(ctx, "delete")?;
        let namespace = kind.item_scope(namespace, name)?;
        self.delete_value(kind, namespace, name, options)
    }

    async fn list<K: Resource>(&self, ctx: &RequestContext, kind: &KindPath, namespace: &str, options: &ListOptions) -> Result<ObjectList<K>, Error> {
        self.check(ctx, "list")?;
        let namespace = kind.collection_scope(namespace)?;
        options.validate()?;
        let (values, resource_version) = self.list_values(kind, namespace, options)?;
        let items = values.into_iter().map(decode).collect::<Result<Vec<K>, _>>()?;
        Ok(ObjectList {
            api_version: Some(kind.api_version().to_string()),
            kind: kind.kind().map(|k| format!("{}List", k)),
            metadata: ListMeta {
                resource_version: Some(resource_version.to_string()),
                ..Default::default()
            },
            items,
        })
    }

    async fn watch<K: Resource>(&self, ctx: &RequestContext, kind: &KindPath, namespace: &str, options: &ListOptions) -> Result<WatchStream<K>, Error> {
        self.check(ctx, "watch")?;
        let namespace = kind.collection_scope(namespace)?;
        options.validate()?;
        let frames = self.watch_frames(kind, namespace, options)?;
        Ok(WatchStream::new(Box::new(ChunkSource::new(frames)), ctx.clone()))
    }
}

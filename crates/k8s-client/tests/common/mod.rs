//! Fake Kubernetes API server for integration tests
//!
//! A wiremock server that stores objects in memory and answers the generic
//! REST verbs the way the API server does: resource versions, 404/409 status
//! bodies, label selector filtering and newline-delimited watch bodies.

#![allow(dead_code)]

use k8s_client::{Client, ConnectionProfile, LabelSelector, Status};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

pub const TEST_TOKEN: &str = "test-token";

/// Objects keyed by (collection path, namespace, name)
type ObjectKey = (String, String, String);

#[derive(Debug, Default)]
struct Store {
    objects: BTreeMap<ObjectKey, Value>,
    resource_version: u64,
}

type SharedStore = Arc<Mutex<Store>>;

/// Parsed `/api/v1/namespaces/{ns}/{plural}/{name}` style path
#[derive(Debug, Clone)]
struct ResourcePath {
    /// Cluster-wide collection path, e.g. `/api/v1/configmaps`
    collection: String,
    plural: String,
    namespace: Option<String>,
    name: Option<String>,
}

fn parse_resource_path(path: &str) -> Option<ResourcePath> {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    let root_len = match segments.first().copied() {
        Some("api") => 2,
        Some("apis") => 3,
        _ => return None,
    };
    if segments.len() <= root_len {
        return None;
    }
    let root = format!("/{}", segments[..root_len].join("/"));
    let rest = &segments[root_len..];
    let (namespace, rest) = if rest.len() >= 3 && rest[0] == "namespaces" {
        (Some(rest[1].to_string()), &rest[2..])
    } else {
        (None, rest)
    };
    let (plural, name) = match rest {
        [plural] => (plural.to_string(), None),
        [plural, name] => (plural.to_string(), Some(name.to_string())),
        _ => return None,
    };
    Some(ResourcePath {
        collection: format!("{}/{}", root, plural),
        plural,
        namespace,
        name,
    })
}

fn lock(store: &SharedStore) -> std::sync::MutexGuard<'_, Store> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

fn status_response(status: Status) -> ResponseTemplate {
    let code = status.code.unwrap_or(500);
    ResponseTemplate::new(code).set_body_json(status)
}

fn query_param(req: &Request, key: &str) -> Option<String> {
    req.url
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

fn labels_of(object: &Value) -> BTreeMap<String, String> {
    object
        .pointer("/metadata/labels")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

/// Running fake API server
pub struct FakeApiServer {
    server: MockServer,
    store: SharedStore,
}

impl FakeApiServer {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let store: SharedStore = Arc::new(Mutex::new(Store::default()));
        mount_resources(&server, &store).await;
        Self { server, store }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Underlying wiremock server, for extra mounts and request inspection
    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Plain-HTTP profile with a bearer token
    pub fn profile(&self) -> ConnectionProfile {
        let mut profile = ConnectionProfile::new(self.uri()).expect("mock server URI is valid");
        profile.token = Some(TEST_TOKEN.to_string());
        profile
    }

    pub fn client(&self) -> Client {
        Client::new(self.profile()).expect("client builds")
    }

    /// Kubeconfig in the shape `kubectl config view -o json` prints
    pub fn kubeconfig_json(&self, namespace: &str) -> String {
        json!({
            "kind": "Config",
            "apiVersion": "v1",
            "preferences": {},
            "clusters": [{"name": "fake", "cluster": {"server": self.uri()}}],
            "users": [{"name": "fake-user", "user": {"token": TEST_TOKEN}}],
            "contexts": [{"name": "fake", "context": {"cluster": "fake", "user": "fake-user", "namespace": namespace}}],
            "current-context": "fake"
        })
        .to_string()
    }

    /// Number of stored objects
    pub fn object_count(&self) -> usize {
        lock(&self.store).objects.len()
    }
}

async fn mount_resources(server: &MockServer, store: &SharedStore) {
    let post_store = Arc::clone(store);
    let get_store = Arc::clone(store);
    let put_store = Arc::clone(store);
    let delete_store = Arc::clone(store);

    // POST create
    Mock::given(method("POST"))
        .and(path_regex(r"^/api(s)?/.*"))
        .respond_with(move |req: &Request| {
            let Some(target) = parse_resource_path(req.url.path()) else {
                return ResponseTemplate::new(404).set_body_string("404 page not found");
            };
            let Ok(mut body) = serde_json::from_slice::<Value>(&req.body) else {
                return status_response(Status::failure(400, "BadRequest", "invalid JSON body"));
            };
            let name = body
                .pointer("/metadata/name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if name.is_empty() {
                return status_response(Status::failure(422, "Invalid", "metadata.name: Required value"));
            }

            let mut store = lock(&post_store);
            let key = (target.collection.clone(), target.namespace.clone().unwrap_or_default(), name.clone());
            if store.objects.contains_key(&key) {
                return status_response(Status::already_exists(&target.plural, &name));
            }
            store.resource_version += 1;
            let metadata = &mut body["metadata"];
            metadata["uid"] = json!(uuid::Uuid::new_v4().to_string());
            metadata["resourceVersion"] = json!(store.resource_version.to_string());
            metadata["creationTimestamp"] = json!("2024-01-01T00:00:00Z");
            if let Some(ns) = &target.namespace {
                metadata["namespace"] = json!(ns);
            }
            store.objects.insert(key, body.clone());
            ResponseTemplate::new(201).set_body_json(body)
        })
        .mount(server)
        .await;

    // GET item, list and watch
    Mock::given(method("GET"))
        .and(path_regex(r"^/api(s)?/.*"))
        .respond_with(move |req: &Request| {
            let Some(target) = parse_resource_path(req.url.path()) else {
                return ResponseTemplate::new(404).set_body_string("404 page not found");
            };
            let store = lock(&get_store);

            if let Some(name) = &target.name {
                let key = (target.collection.clone(), target.namespace.clone().unwrap_or_default(), name.clone());
                return match store.objects.get(&key) {
                    Some(object) => ResponseTemplate::new(200).set_body_json(object.clone()),
                    None => status_response(Status::not_found(&target.plural, name)),
                };
            }

            let selector: LabelSelector = match query_param(req, "labelSelector").unwrap_or_default().parse() {
                Ok(selector) => selector,
                Err(e) => return status_response(Status::failure(400, "BadRequest", e.to_string())),
            };
            let items: Vec<Value> = store
                .objects
                .iter()
                .filter(|((collection, ns, _), _)| {
                    *collection == target.collection
                        && target.namespace.as_ref().is_none_or(|want| want == ns)
                })
                .filter(|(_, object)| selector.matches(&labels_of(object)))
                .map(|(_, object)| object.clone())
                .collect();

            if query_param(req, "watch").as_deref() == Some("true") {
                let mut body = Vec::new();
                for item in items {
                    body.extend(json!({"type": "ADDED", "object": item}).to_string().into_bytes());
                    body.push(b'\n');
                }
                return ResponseTemplate::new(200).set_body_raw(body, "application/json");
            }

            ResponseTemplate::new(200).set_body_json(json!({
                "kind": "List",
                "apiVersion": "v1",
                "metadata": {"resourceVersion": store.resource_version.to_string()},
                "items": items
            }))
        })
        .mount(server)
        .await;

    // PUT update with optimistic concurrency
    Mock::given(method("PUT"))
        .and(path_regex(r"^/api(s)?/.*"))
        .respond_with(move |req: &Request| {
            let Some(ResourcePath { collection, plural, namespace, name: Some(name) }) =
                parse_resource_path(req.url.path())
            else {
                return ResponseTemplate::new(405).set_body_string("method not allowed");
            };
            let Ok(mut body) = serde_json::from_slice::<Value>(&req.body) else {
                return status_response(Status::failure(400, "BadRequest", "invalid JSON body"));
            };
            let mut store = lock(&put_store);
            let key = (collection, namespace.unwrap_or_default(), name.clone());
            let Some(stored) = store.objects.get(&key) else {
                return status_response(Status::not_found(&plural, &name));
            };
            let stored_version = stored.pointer("/metadata/resourceVersion").cloned();
            let sent_version = body.pointer("/metadata/resourceVersion").cloned();
            if sent_version.is_some() && sent_version != stored_version {
                return status_response(Status::conflict(&plural, &name));
            }
            let uid = stored.pointer("/metadata/uid").cloned().unwrap_or(Value::Null);
            store.resource_version += 1;
            body["metadata"]["resourceVersion"] = json!(store.resource_version.to_string());
            body["metadata"]["uid"] = uid;
            store.objects.insert(key, body.clone());
            ResponseTemplate::new(200).set_body_json(body)
        })
        .mount(server)
        .await;

    // DELETE
    Mock::given(method("DELETE"))
        .and(path_regex(r"^/api(s)?/.*"))
        .respond_with(move |req: &Request| {
            let Some(ResourcePath { collection, plural, namespace, name: Some(name) }) =
                parse_resource_path(req.url.path())
            else {
                return ResponseTemplate::new(405).set_body_string("method not allowed");
            };
            let mut store = lock(&delete_store);
            let key = (collection, namespace.unwrap_or_default(), name.clone());
            match store.objects.remove(&key) {
                Some(_) => ResponseTemplate::new(200).set_body_json(json!({
                    "kind": "Status",
                    "apiVersion": "v1",
                    "status": "Success",
                    "details": {"name": name, "kind": plural}
                })),
                None => status_response(Status::not_found(&plural, &name)),
            }
        })
        .mount(server)
        .await;
}

/// Route test logs through the test harness; safe to call repeatedly
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

//! Generic Kubernetes resource client
//!
//! One `Client` serves every kind: the URL comes from a [`KindPath`], the
//! payload type from the caller's generic parameter. Every call takes a
//! [`RequestContext`] and is abandoned (connection dropped) when it fires.

use crate::client_trait::KubeClientTrait;
use crate::config::{ConnectionProfile, Kubeconfig};
use crate::context::RequestContext;
use crate::error::Error;
use crate::params::{DeleteOptions, ListOptions};
use crate::path::KindPath;
use crate::transport::{Transport, TransportOptions};
use crate::watch::WatchStream;
use k8s_types::{ObjectList, Resource};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

/// Kubernetes API client
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone, Debug)]
pub struct Client {
    transport: Transport,
    default_namespace: String,
}

impl Client {
    /// Create a client with default transport options
    pub fn new(profile: ConnectionProfile) -> Result<Self, Error> {
        Self::with_options(profile, TransportOptions::default())
    }

    /// Create a client with explicit timeouts and user agent
    pub fn with_options(profile: ConnectionProfile, options: TransportOptions) -> Result<Self, Error> {
        let transport = Transport::new(&profile, &options)?;
        info!(
            "Kubernetes client ready for {} (default namespace {})",
            transport.base_url(),
            profile.namespace
        );
        Ok(Self {
            transport,
            default_namespace: profile.namespace,
        })
    }

    /// Create a client from the pod service account when running in a
    /// cluster, otherwise from `$KUBECONFIG` or `~/.kube/config`
    pub fn try_default() -> Result<Self, Error> {
        let profile = if ConnectionProfile::in_cluster_env_present() {
            ConnectionProfile::in_cluster()?
        } else {
            ConnectionProfile::from_kubeconfig(&Kubeconfig::read()?)?
        };
        Self::new(profile)
    }

    /// Namespace used by `create` when the payload has none
    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    /// API server URL
    pub fn base_url(&self) -> &str {
        self.transport.base_url()
    }

    /// Create an object; returns the server's version of it
    pub async fn create<K: Resource>(
        &self,
        ctx: &RequestContext,
        kind: &KindPath,
        payload: &K,
    ) -> Result<K, Error> {
        let namespace = kind.create_scope(payload, &self.default_namespace)?;
        let body = kind.encode_payload(payload)?;
        let request = self
            .transport
            .request(Method::POST, &kind.collection_path(namespace));
        let response = self.send(ctx, with_json_body(request, &body)?).await?;
        self.read_json(ctx, response).await
    }

    /// Fetch one object
    pub async fn get<K: Resource>(
        &self,
        ctx: &RequestContext,
        kind: &KindPath,
        namespace: &str,
        name: &str,
    ) -> Result<K, Error> {
        let namespace = kind.item_scope(namespace, name)?;
        let request = self
            .transport
            .request(Method::GET, &kind.item_path(namespace, name));
        let response = self.send(ctx, request).await?;
        self.read_json(ctx, response).await
    }

    /// Replace an object, addressed by its own metadata
    ///
    /// A stale `resourceVersion` in the payload yields [`Error::Conflict`];
    /// nothing is retried.
    pub async fn update<K: Resource>(
        &self,
        ctx: &RequestContext,
        kind: &KindPath,
        payload: &K,
    ) -> Result<K, Error> {
        let (namespace, name) = kind.update_target(payload)?;
        let body = kind.encode_payload(payload)?;
        let request = self
            .transport
            .request(Method::PUT, &kind.item_path(namespace, name));
        let response = self.send(ctx, with_json_body(request, &body)?).await?;
        self.read_json(ctx, response).await
    }

    /// Delete an object
    pub async fn delete(
        &self,
        ctx: &RequestContext,
        kind: &KindPath,
        namespace: &str,
        name: &str,
    ) -> Result<(), Error> {
        self.delete_with(ctx, kind, namespace, name, &DeleteOptions::default())
            .await
    }

    /// Delete an object with propagation, grace period or preconditions
    pub async fn delete_with(
        &self,
        ctx: &RequestContext,
        kind: &KindPath,
        namespace: &str,
        name: &str,
        options: &DeleteOptions,
    ) -> Result<(), Error> {
        let namespace = kind.item_scope(namespace, name)?;
        let mut request = self
            .transport
            .request(Method::DELETE, &kind.item_path(namespace, name));
        if !options.is_empty() {
            request = with_json_body(request, &options.to_body())?;
        }
        let response = self.send(ctx, request).await?;
        // Drain the body so the connection can be reused
        ctx.run(async { response.bytes().await.map_err(Error::Transport) })
            .await?;
        Ok(())
    }

    /// List objects; an empty namespace spans all namespaces
    pub async fn list<K: Resource>(
        &self,
        ctx: &RequestContext,
        kind: &KindPath,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<ObjectList<K>, Error> {
        let namespace = kind.collection_scope(namespace)?;
        options.validate()?;
        let request = self
            .transport
            .request(Method::GET, &with_query(kind.collection_path(namespace), &options.to_query_string(false)));
        let response = self.send(ctx, request).await?;
        self.read_json(ctx, response).await
    }

    /// List every page, following `continue` tokens
    pub async fn list_all<K: Resource>(
        &self,
        ctx: &RequestContext,
        kind: &KindPath,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<ObjectList<K>, Error> {
        KubeClientTrait::list_all(self, ctx, kind, namespace, options).await
    }

    /// Open a watch; events are decoded lazily from the response body
    pub async fn watch<K: Resource>(
        &self,
        ctx: &RequestContext,
        kind: &KindPath,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<WatchStream<K>, Error> {
        let namespace = kind.collection_scope(namespace)?;
        options.validate()?;
        let request = self
            .transport
            .streaming_request(Method::GET, &with_query(kind.collection_path(namespace), &options.to_query_string(true)));
        let response = self.send(ctx, request).await?;
        Ok(WatchStream::new(Box::new(response), ctx.clone()))
    }

    /// Send a request under `ctx` and turn non-2xx responses into errors
    async fn send(&self, ctx: &RequestContext, request: RequestBuilder) -> Result<Response, Error> {
        let response = ctx
            .run(async { request.send().await.map_err(Error::Transport) })
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().to_string();
        let body = ctx
            .run(async { response.bytes().await.map_err(Error::Transport) })
            .await?;
        let err = Error::from_response(status.as_u16(), &body);
        if err.api_error().is_some_and(|e| e.status.is_none()) {
            warn!(
                "{} returned {} without a status body: {}",
                url,
                status,
                String::from_utf8_lossy(&body).chars().take(200).collect::<String>()
            );
        } else {
            debug!("{} returned {}: {}", url, status, err);
        }
        Err(err)
    }

    async fn read_json<T: DeserializeOwned>(&self, ctx: &RequestContext, response: Response) -> Result<T, Error> {
        let body = ctx
            .run(async { response.bytes().await.map_err(Error::Transport) })
            .await?;
        serde_json::from_slice(&body).map_err(|e| {
            Error::Encoding(format!(
                "error decoding response body: {} - Response (first 500 chars): {}",
                e,
                String::from_utf8_lossy(&body).chars().take(500).collect::<String>()
            ))
        })
    }
}

fn with_json_body(request: RequestBuilder, body: &serde_json::Value) -> Result<RequestBuilder, Error> {
    let bytes = serde_json::to_vec(body).map_err(|e| Error::encoding("failed to encode request body", e))?;
    Ok(request
        .header("Content-Type", "application/json")
        .body(bytes))
}

fn with_query(path: String, query: &str) -> String {
    if query.is_empty() {
        path
    } else {
        format!("{}?{}", path, query)
    }
}

#[async_trait::async_trait]
impl KubeClientTrait for Client {
    fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    async fn create<K: Resource>(&self, ctx: &RequestContext, kind: &KindPath, payload: &K) -> Result<K, Error> {
        Client::create(self, ctx, kind, payload).await
    }

    async fn get<K: Resource>(&self, ctx: &RequestContext, kind: &KindPath, namespace: &str, name: &str) -> Result<K, Error> {
        Client::get(self, ctx, kind, namespace, name).await
    }

    async fn update<K: Resource>(&self, ctx: &RequestContext, kind: &KindPath, payload: &K) -> Result<K, Error> {
        Client::update(self, ctx, kind, payload).await
    }

    async fn delete_with(
        &self,
        ctx: &RequestContext,
        kind: &KindPath,
        namespace: &str,
        name: &str,
        options: &DeleteOptions,
    ) -> Result<(), Error> {
        Client::delete_with(self, ctx, kind, namespace, name, options).await
    }

    async fn list<K: Resource>(&self, ctx: &RequestContext, kind: &KindPath, namespace: &str, options: &ListOptions) -> Result<ObjectList<K>, Error> {
        Client::list(self, ctx, kind, namespace, options).await
    }

    async fn watch<K: Resource>(&self, ctx: &RequestContext, kind: &KindPath, namespace: &str, options: &ListOptions) -> Result<WatchStream<K>, Error> {
        Client::watch(self, ctx, kind, namespace, options).await
    }
}

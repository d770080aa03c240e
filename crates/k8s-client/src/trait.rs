//! KubeClientTrait for mocking
//!
//! This trait abstracts the resource verbs so that code built on the client
//! can be unit tested against [`MockKubeClient`](crate::mock::MockKubeClient).
//! The concrete [`Client`](crate::Client) implements it by delegation.
//!
//! Every resource verb is generic over the payload type, so the trait is not
//! object safe: accept it as a generic parameter (`C: KubeClientTrait`) rather
//! than as `dyn KubeClientTrait`.

use crate::context::RequestContext;
use crate::error::Error;
use crate::params::{DeleteOptions, ListOptions};
use crate::path::KindPath;
use crate::watch::WatchStream;
use k8s_types::{ObjectList, Resource};
use tracing::debug;

/// Trait for Kubernetes resource operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait KubeClientTrait: Send + Sync {
    /// Namespace used by `create` when the payload has none
    fn default_namespace(&self) -> &str;

    /// Create an object; returns the stored version
    async fn create<K: Resource>(&self, ctx: &RequestContext, kind: &KindPath, payload: &K) -> Result<K, Error>;

    /// Fetch one object
    async fn get<K: Resource>(&self, ctx: &RequestContext, kind: &KindPath, namespace: &str, name: &str) -> Result<K, Error>;

    /// Replace an object addressed by its own metadata
    async fn update<K: Resource>(&self, ctx: &RequestContext, kind: &KindPath, payload: &K) -> Result<K, Error>;

    /// Delete an object with propagation, grace period or preconditions
    async fn delete_with(
        &self,
        ctx: &RequestContext,
        kind: &KindPath,
        namespace: &str,
        name: &str,
        options: &DeleteOptions,
    ) -> Result<(), Error>;

    /// Delete an object
    async fn delete(&self, ctx: &RequestContext, kind: &KindPath, namespace: &str, name: &str) -> Result<(), Error> {
        self.delete_with(ctx, kind, namespace, name, &DeleteOptions::default())
            .await
    }

    /// List one page of objects; an empty namespace spans all namespaces
    async fn list<K: Resource>(&self, ctx: &RequestContext, kind: &KindPath, namespace: &str, options: &ListOptions) -> Result<ObjectList<K>, Error>;

    /// List every page, following `continue` tokens
    async fn list_all<K: Resource>(
        &self,
        ctx: &RequestContext,
        kind: &KindPath,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<ObjectList<K>, Error> {
        let mut page: ObjectList<K> = self.list(ctx, kind, namespace, options).await?;
        let mut items = std::mem::take(&mut page.items);
        while let Some(token) = page.continue_token().map(str::to_string) {
            debug!("Fetching next {} page", kind.plural());
            let next = options.clone().continue_token(token);
            page = self.list(ctx, kind, namespace, &next).await?;
            items.append(&mut page.items);
        }
        page.items = items;
        page.metadata.continue_token = None;
        page.metadata.remaining_item_count = None;
        Ok(page)
    }

    /// Open a watch over a collection
    async fn watch<K: Resource>(&self, ctx: &RequestContext, kind: &KindPath, namespace: &str, options: &ListOptions) -> Result<WatchStream<K>, Error>;
}

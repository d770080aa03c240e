//! Typed Kubernetes API client
//!
//! A small, generic client for the Kubernetes REST API. Any payload type that
//! implements [`Resource`] can be created, read, updated, deleted, listed and
//! watched through one [`Client`].
//!
//! # Example
//!
//! ```no_run
//! use k8s_client::{Client, ConfigMap, KindPath, LabelSelector, ListOptions, RequestContext};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), k8s_client::Error> {
//! // Build a client from $KUBECONFIG, ~/.kube/config or the pod service account
//! let client = Client::try_default()?;
//! let ctx = RequestContext::background().with_timeout(Duration::from_secs(30));
//! let configmaps = KindPath::of::<ConfigMap>();
//!
//! let mut cm = ConfigMap::new("default", "abc123");
//! cm.metadata = cm.metadata.with_label("testLabel", "xyz789");
//! let created = client.create(&ctx, &configmaps, &cm).await?;
//!
//! // Optimistic concurrency: a stale resourceVersion yields Error::Conflict
//! let updated = client.update(&ctx, &configmaps, &created.with_data("zam", "spam")).await?;
//!
//! let selector = LabelSelector::new().eq("testLabel", "xyz789");
//! let list = client
//!     .list::<ConfigMap>(&ctx, &configmaps, "default", &ListOptions::default().labels(&selector))
//!     .await?;
//! assert_eq!(list.len(), 1);
//!
//! client.delete(&ctx, &configmaps, "default", updated.metadata.name.as_deref().unwrap_or_default()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Config loading**: kubeconfig (YAML/JSON) and in-cluster service accounts
//! - **TLS**: custom trust anchors, client certificates, bearer/basic auth
//! - **Selectors**: label and field selector builders with parse-back
//! - **Watches**: incremental newline-delimited decoding that survives bad frames
//! - **Cancellation**: every call honours a [`RequestContext`]
//! - **Testing**: [`MockKubeClient`] behind the `test-util` feature

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod params;
pub mod path;
pub mod selector;
pub mod transport;
pub mod watch;
#[path = "trait.rs"]
pub mod client_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::Client;
pub use client_trait::KubeClientTrait;
pub use config::{BasicAuth, ClientIdentity, ConnectionProfile, Kubeconfig, DEFAULT_NAMESPACE};
pub use context::{CancelHandle, CancelReason, RequestContext};
pub use error::{ApiError, Error, ErrorKind};
pub use params::{DeleteOptions, ListOptions, Preconditions, PropagationPolicy};
pub use path::KindPath;
pub use selector::{FieldOperator, FieldRequirement, FieldSelector, LabelSelector, Requirement};
pub use transport::{AuthDecorator, Transport, TransportOptions};
pub use watch::{ByteSource, ChunkSource, DEFAULT_MAX_FRAME_BYTES, WatchStream};
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockKubeClient;

pub use k8s_types::*;

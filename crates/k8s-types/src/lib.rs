//! Kubernetes wire types
//!
//! Data shapes exchanged with the Kubernetes API server: object metadata,
//! status documents, list wrappers and watch events, plus the accessor
//! contract (`Resource`) the generic client uses to stay payload-agnostic.
//!
//! Only the core/v1 kinds needed to exercise the client (ConfigMap, Node) are
//! defined here; anything else can travel as a `DynamicObject`.

pub mod core_v1;
pub mod dynamic;
pub mod list;
pub mod meta;
pub mod resource;
pub mod status;
pub mod watch;

pub use core_v1::*;
pub use dynamic::*;
pub use list::*;
pub use meta::*;
pub use resource::*;
pub use status::*;
pub use watch::*;

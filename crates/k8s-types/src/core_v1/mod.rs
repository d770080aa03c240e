//! core/v1 kinds
//!
//! Thin data shapes for the kinds the client is exercised with:
//! - ConfigMap (namespaced)
//! - Node (cluster-scoped)

pub mod config_map;
pub mod node;

pub use config_map::*;
pub use node::*;

//! Domain models for nodeset management.
//!
//! This module contains the core domain types: node identifiers, nodes,
//! models, the model catalog and configuration.

/// Node identifiers and numeric-aware ordering.
pub mod node_id;
pub use node_id::{
    Error as NodeIdError, ExpandedNodeId, Identifier, NodeId, QualifiedName, UA_NAMESPACE,
    natural_cmp,
};

mod namespace;
pub use namespace::NamespaceTable;

mod node;
pub use node::{Node, NodeKind, Payload, Reference};

/// Models and their dependencies.
pub mod model;
pub use model::{Error as ModelError, Model, RequiredModel};

mod catalog;
pub use catalog::{Catalog, MergeOutcome};

mod order;
pub use order::order_by_dependencies;

mod config;
pub use config::Config;

//! Hierarchical metadata store for the depot artifact repository.
//!
//! The store holds a tree of named locations rooted at the empty
//! [`Location`](depot_types::Location). Nodes at depth `num_levels` are
//! objects that reference a file in a storage backend; every other node is a
//! plain location carrying metadata.
//!
//! # Invariants
//!
//! 1. The root always exists. Deleting it removes its children only.
//! 2. Depth is bounded by `num_levels`; depth `num_levels` means object.
//! 3. A node can only be created below an existing parent.
//! 4. Deleting a node that has children requires `recursive = true`.
//! 5. Nodes are identified by their location alone.
//!
//! # Transactions
//!
//! Every operation runs on a [`MetadataTxn`] obtained from
//! [`MetadataStore::query_context`]. Changes become visible to other scopes
//! on [`MetadataTxn::commit`]; dropping an uncommitted handle rolls back
//! everything done through it.
//!
//! # Backends
//!
//! - [`TreeMetadataStore`] -- in-memory tree with an optional JSON snapshot

pub mod error;
pub mod snapshot;
pub mod traits;
pub mod tree;

pub use error::{MetaError, MetaResult};
pub use traits::{with_query_context, MetadataStore, MetadataTxn};
pub use tree::TreeMetadataStore;

//! Foundation types for the depot artifact repository.
//!
//! This crate provides the value types shared by every other depot crate.
//! Nothing here performs I/O.
//!
//! # Key Types
//!
//! - [`Location`]: Ordered, `:`-separated path into the repository hierarchy
//! - [`LocationInfo`]: Descriptive record of a node (metadata + timestamps)
//! - [`ObjectInfo`]: Record of a leaf node that references a stored file
//! - [`Filter`]: Optional listing predicates
//! - [`Permissions`]: Read/write/delete capability set

pub mod error;
pub mod filter;
pub mod info;
pub mod location;
pub mod permissions;

pub use error::TypeError;
pub use filter::Filter;
pub use info::{LocationInfo, Metadata, ObjectInfo, DEFAULT_MIME};
pub use location::{Location, SEPARATOR};
pub use permissions::Permissions;

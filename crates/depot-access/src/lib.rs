//! Access control for the depot artifact repository.
//!
//! A policy maps an identity and a location to [`Permissions`]. Identities
//! are opaque strings produced by an external authenticator; `None` or the
//! empty string means anonymous. Policies are pure functions of their
//! inputs and configuration.
//!
//! # Policies
//!
//! - [`UserSpaceAccessControl`] -- full access inside the caller's own
//!   namespace, read-only (or nothing) elsewhere
//! - [`SimpleAccessControl`] -- authenticated callers may write, optionally
//!   only inside their own namespace
//! - [`FixedAccessControl`] -- the same permissions for everyone
//!
//! [`Permissions`]: depot_types::Permissions

pub mod fixed;
pub mod simple;
pub mod traits;
pub mod userspace;

pub use fixed::FixedAccessControl;
pub use simple::SimpleAccessControl;
pub use traits::{is_owner, AccessControl};
pub use userspace::UserSpaceAccessControl;

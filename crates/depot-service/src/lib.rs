//! Repository operations for the depot artifact repository.
//!
//! [`ArtifactService`] is what a transport layer calls: it checks the
//! caller's permissions, runs metadata changes inside a query context and
//! keeps stored files in step with the metadata.
//!
//! Everything the service needs is bundled in a [`RepositoryContext`], built
//! once from a [`RepositoryConfig`] and shared by reference. There is no
//! global state.

pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod service;
pub mod view;

pub use config::{AccessConfig, LogConfig, MetadataConfig, RepositoryConfig, StorageConfig};
pub use context::{RepositoryContext, ServiceSettings};
pub use error::{ErrorKind, ServiceError, ServiceResult};
pub use logging::init_logging;
pub use service::{ArtifactService, ObjectUpload, ReadOutcome};
pub use view::{Listing, LocationView, ObjectView, PutOutcome, RepositoryInfo};

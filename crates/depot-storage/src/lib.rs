//! File storage for the depot artifact repository.
//!
//! Metadata lives in `depot-meta`; the bytes of every object live in a
//! [`Storage`] backend. A file is written through a [`WriteStream`] that only
//! becomes visible when closed, so an interrupted upload never replaces
//! existing content.
//!
//! # Backends
//!
//! - [`FsStorage`] -- files below a local directory, `file://` URIs
//! - [`RemoteBlobStorage`] -- any [`BlobService`], uploads staged in a
//!   temporary blob and copied into place on commit
//!
//! # Streams
//!
//! Every stream is in one of three states ([`StreamState`]). `Open` accepts
//! writes; `close` moves it to `Committed`, `abort` to `Aborted`. Both final
//! states reject further writes.

pub mod blob;
pub mod bridge;
pub mod error;
pub mod fs;
pub mod naming;
pub mod traits;

pub use blob::{BlobService, InMemoryBlobService, RemoteBlobStorage, RemoteOptions};
pub use bridge::{stream_bridge, BridgeReader, BridgeWriter, DEFAULT_BRIDGE_CAPACITY};
pub use error::{StorageError, StorageResult};
pub use fs::FsStorage;
pub use traits::{write_scoped, ReadHandle, Storage, StreamState, WriteGuard, WriteStream};

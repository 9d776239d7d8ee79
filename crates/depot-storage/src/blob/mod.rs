//! Remote blob storage.
//!
//! [`BlobService`] is the narrow surface a remote object store has to offer;
//! [`RemoteBlobStorage`] builds the [`Storage`](crate::Storage) contract on
//! top of it.

use std::io::{Read, Write};

use crate::error::StorageResult;

pub mod memory;
pub mod remote;

pub use memory::InMemoryBlobService;
pub use remote::{RemoteBlobStorage, RemoteOptions};

/// A flat namespace of named blobs, as offered by cloud object stores.
///
/// Names use `/` as a virtual directory separator.
pub trait BlobService: Send + Sync {
    /// Create or replace `name` with everything `reader` yields. Returns the
    /// number of bytes stored.
    fn upload(&self, name: &str, reader: &mut dyn Read) -> StorageResult<u64>;

    /// Server-side copy of `source` to `dest`, replacing `dest`.
    fn copy(&self, dest: &str, source: &str) -> StorageResult<()>;

    /// Delete `name`. Returns `true` if it existed.
    fn delete(&self, name: &str) -> StorageResult<bool>;

    /// Size of `name`, or `None` if it does not exist.
    fn size(&self, name: &str) -> StorageResult<Option<u64>>;

    /// Stream the content of `name` into `sink`. Returns the bytes written.
    fn download(&self, name: &str, sink: &mut dyn Write) -> StorageResult<u64>;

    /// URL under which `name` is addressed.
    fn url(&self, name: &str) -> String;
}

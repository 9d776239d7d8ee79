use std::io::{ErrorKind, Read};

use tracing::warn;

use depot_types::Location;

use crate::error::{StorageError, StorageResult};

/// Reader handed out by [`Storage::open_read_file`].
pub type ReadHandle = Box<dyn Read + Send>;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Lifecycle of a [`WriteStream`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamState {
    /// Accepting writes.
    Open,
    /// Content is durable and visible at the target.
    Committed,
    /// Content was discarded. The target is untouched.
    Aborted,
}

impl StreamState {
    pub fn is_open(self) -> bool {
        self == Self::Open
    }
}

/// A file being written to a storage backend.
///
/// Nothing written becomes visible until [`close`](Self::close) succeeds.
/// Existing content at the target is replaced only at that point.
pub trait WriteStream: Send {
    /// Write all of `data`. Returns the number of bytes written.
    ///
    /// Fails with [`StorageError::StreamClosed`] unless the stream is open.
    /// A write that would exceed the declared content length fails with
    /// [`StorageError::WriteOverflow`] and aborts the stream.
    fn write(&mut self, data: &[u8]) -> StorageResult<usize>;

    /// Commit the written content. A no-op on a committed stream; fails with
    /// [`StorageError::StreamAborted`] on an aborted one.
    fn close(&mut self) -> StorageResult<()>;

    /// Discard the written content. A no-op on an aborted stream; fails with
    /// [`StorageError::AbortAfterCommit`] on a committed one.
    fn abort(&mut self) -> StorageResult<()>;

    fn state(&self) -> StreamState;

    /// Copy `reader` to its end into this stream. Returns the bytes copied.
    fn copy_from(&mut self, reader: &mut dyn Read) -> StorageResult<u64> {
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut total = 0u64;
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => return Ok(total),
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            self.write(&buf[..n])?;
            total += n as u64;
        }
    }
}

/// A file storage backend.
///
/// A file is addressed by the object location, its filename and the URI the
/// backend returned when the file was opened for writing.
pub trait Storage: Send + Sync {
    /// Whether files can be stored for `location`. Callers treat the root as
    /// always supported for non-file operations.
    fn supports_location(&self, location: &Location) -> bool;

    /// Open a stream for a file of exactly `content_length` bytes.
    ///
    /// Returns the stream and the URI under which the file will be
    /// reachable once the stream is closed.
    fn open_write_file(
        &self,
        location: &Location,
        filename: &str,
        content_length: u64,
    ) -> StorageResult<(Box<dyn WriteStream>, String)>;

    /// Open a stored file for reading. Returns the reader and the file size.
    fn open_read_file(
        &self,
        location: &Location,
        filename: &str,
        uri: &str,
    ) -> StorageResult<(ReadHandle, u64)>;

    /// Delete a stored file.
    fn delete_file(&self, location: &Location, filename: &str, uri: &str) -> StorageResult<()>;
}

/// Aborts the wrapped stream on drop unless it was closed.
///
/// Covers early returns and panics between opening a stream and closing it.
pub struct WriteGuard {
    stream: Box<dyn WriteStream>,
    armed: bool,
}

impl WriteGuard {
    pub fn new(stream: Box<dyn WriteStream>) -> Self {
        Self {
            stream,
            armed: true,
        }
    }

    pub fn stream_mut(&mut self) -> &mut dyn WriteStream {
        &mut *self.stream
    }

    pub fn state(&self) -> StreamState {
        self.stream.state()
    }

    /// Close the stream. If closing fails the guard stays armed, so a stream
    /// left open is still aborted on drop.
    pub fn close(mut self) -> StorageResult<()> {
        self.stream.close()?;
        self.armed = false;
        Ok(())
    }

    /// Abort the stream now and return the abort result.
    pub fn abort(mut self) -> StorageResult<()> {
        self.armed = false;
        self.stream.abort()
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        if !self.armed || !self.stream.state().is_open() {
            return;
        }
        if let Err(e) = self.stream.abort() {
            warn!(error = %e, "failed to abort write stream");
        }
    }
}

impl std::fmt::Debug for WriteGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteGuard")
            .field("state", &self.stream.state())
            .field("armed", &self.armed)
            .finish()
    }
}

/// Run `f` against `stream`, closing it on `Ok` and aborting it on `Err`.
///
/// A failing abort is logged; the error returned is always the one from `f`.
pub fn write_scoped<T, E, F>(stream: Box<dyn WriteStream>, f: F) -> Result<T, E>
where
    F: FnOnce(&mut dyn WriteStream) -> Result<T, E>,
    E: From<StorageError>,
{
    let mut guard = WriteGuard::new(stream);
    let value = f(guard.stream_mut())?;
    guard.close()?;
    Ok(value)
}

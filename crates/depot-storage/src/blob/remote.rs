//! [`Storage`] on top of a [`BlobService`].
//!
//! A write stream owns one worker thread. The worker uploads everything the
//! caller writes, read through a [`stream_bridge`], into a temporary blob.
//! Once the upload ends it copies the temporary blob to its final name, but
//! only if the stream was closed rather than aborted, and always deletes the
//! temporary blob afterwards.
//!
//! The commit decision is recorded before the bridge is closed, so the
//! worker never sees end of stream without knowing whether to copy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, warn};
use uuid::Uuid;

use depot_types::Location;

use crate::bridge::{stream_bridge, BridgeReader, BridgeWriter, DEFAULT_BRIDGE_CAPACITY};
use crate::error::{StorageError, StorageResult};
use crate::naming::{blob_segment, secure_filename};
use crate::traits::{ReadHandle, Storage, StreamState, WriteStream};

use super::BlobService;

/// How long `abort` waits for the upload worker by default.
pub const DEFAULT_ABORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Tuning for [`RemoteBlobStorage`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemoteOptions {
    /// Bytes buffered between the caller and an upload or download worker.
    pub buffer_capacity: usize,
    /// Upper bound on how long `abort` blocks.
    pub abort_timeout: Duration,
}

impl Default for RemoteOptions {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BRIDGE_CAPACITY,
            abort_timeout: DEFAULT_ABORT_TIMEOUT,
        }
    }
}

fn is_supported_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '/' | '@')
}

/// `.` and `..` would be normalized away by blob services that resolve
/// names like paths.
fn is_dot_segment(segment: &str) -> bool {
    matches!(segment, "." | "..")
}

fn scheme(uri: &str) -> Option<&str> {
    uri.split_once("://").map(|(scheme, _)| scheme)
}

/// Stores files as blobs in a [`BlobService`].
#[derive(Clone)]
pub struct RemoteBlobStorage {
    service: Arc<dyn BlobService>,
    options: RemoteOptions,
}

impl RemoteBlobStorage {
    pub fn new(service: Arc<dyn BlobService>) -> Self {
        Self::with_options(service, RemoteOptions::default())
    }

    pub fn with_options(service: Arc<dyn BlobService>, options: RemoteOptions) -> Self {
        Self { service, options }
    }

    pub fn options(&self) -> RemoteOptions {
        self.options
    }

    /// Final blob name for `(location, filename)`:
    /// `data/<seg>/<seg>/.../<secured filename>`.
    pub fn blob_name(location: &Location, filename: &str) -> String {
        let mut name = String::from("data");
        for segment in location.iter() {
            name.push('/');
            name.push_str(&blob_segment(segment));
        }
        name.push('/');
        name.push_str(&secure_filename(filename));
        name
    }

    fn temporary_blob_name() -> String {
        format!("tmp/{}.bin", Uuid::now_v7())
    }

    /// Check a caller-supplied URI against the derived blob. Blobs are always
    /// addressed by the derived name.
    fn check_uri(&self, location: &Location, name: &str, uri: &str) -> StorageResult<()> {
        let expected = self.service.url(name);
        if uri == expected {
            return Ok(());
        }
        if scheme(uri) != scheme(&expected) {
            warn!(%location, uri, "URI scheme does not match blob service");
            return Err(StorageError::FileDoesNotExist(location.clone()));
        }
        warn!(%location, have = uri, should = %expected, "blob URI deviates from derived name");
        Ok(())
    }
}

impl std::fmt::Debug for RemoteBlobStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteBlobStorage")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Storage for RemoteBlobStorage {
    fn supports_location(&self, location: &Location) -> bool {
        !location.is_root()
            && location.validate(None, None, Some(&is_supported_char))
            && location.iter().all(|segment| !is_dot_segment(segment))
    }

    fn open_write_file(
        &self,
        location: &Location,
        filename: &str,
        content_length: u64,
    ) -> StorageResult<(Box<dyn WriteStream>, String)> {
        if !self.supports_location(location) {
            return Err(StorageError::UnsupportedLocation(location.clone()));
        }
        let blob_name = Self::blob_name(location, filename);
        let temp_name = Self::temporary_blob_name();
        let uri = self.service.url(&blob_name);

        let (writer, reader) = stream_bridge(self.options.buffer_capacity);
        let commit = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = mpsc::channel();

        let worker = UploadWorker {
            service: Arc::clone(&self.service),
            temp_name,
            blob_name,
            commit: Arc::clone(&commit),
        };
        thread::Builder::new()
            .name("depot-blob-upload".into())
            .spawn(move || {
                let result = worker.run(reader);
                // The stream may already be gone after an abort timeout.
                let _ = done_tx.send(result);
            })?;

        debug!(%location, %uri, content_length, "opened blob for writing");
        let stream = RemoteWriteStream {
            location: location.clone(),
            writer: Some(writer),
            commit,
            done: done_rx,
            content_length,
            written: 0,
            state: StreamState::Open,
            abort_timeout: self.options.abort_timeout,
        };
        Ok((Box::new(stream), uri))
    }

    fn open_read_file(
        &self,
        location: &Location,
        filename: &str,
        uri: &str,
    ) -> StorageResult<(ReadHandle, u64)> {
        let name = Self::blob_name(location, filename);
        self.check_uri(location, &name, uri)?;
        let size = self
            .service
            .size(&name)?
            .ok_or_else(|| StorageError::FileDoesNotExist(location.clone()))?;

        let (mut writer, reader) = stream_bridge(self.options.buffer_capacity);
        let service = Arc::clone(&self.service);
        thread::Builder::new()
            .name("depot-blob-download".into())
            .spawn(move || match service.download(&name, &mut writer) {
                Ok(_) => writer.close(),
                Err(e) => {
                    if !writer.is_disconnected() {
                        warn!(blob = %name, error = %e, "blob download failed");
                    }
                    writer.fail(e.to_string());
                }
            })?;
        Ok((Box::new(reader), size))
    }

    fn delete_file(&self, location: &Location, filename: &str, uri: &str) -> StorageResult<()> {
        let name = Self::blob_name(location, filename);
        self.check_uri(location, &name, uri)?;
        if !self.service.delete(&name)? {
            return Err(StorageError::FileDoesNotExist(location.clone()));
        }
        debug!(%location, blob = %name, "deleted blob");
        Ok(())
    }
}

struct UploadWorker {
    service: Arc<dyn BlobService>,
    temp_name: String,
    blob_name: String,
    commit: Arc<AtomicBool>,
}

impl UploadWorker {
    fn run(self, mut reader: BridgeReader) -> StorageResult<()> {
        let uploaded = self.service.upload(&self.temp_name, &mut reader);
        // Unblocks a writer still waiting on a failed upload.
        drop(reader);

        let result = uploaded.and_then(|bytes| {
            if !self.commit.load(Ordering::SeqCst) {
                debug!(temp = %self.temp_name, "upload aborted, skipping copy");
                return Ok(());
            }
            self.service.copy(&self.blob_name, &self.temp_name)?;
            debug!(blob = %self.blob_name, bytes, "committed blob");
            Ok(())
        });

        match self.service.delete(&self.temp_name) {
            Ok(_) => {}
            Err(e) => warn!(temp = %self.temp_name, error = %e, "failed to delete temporary blob"),
        }
        result
    }
}

/// Write stream feeding an [`UploadWorker`].
struct RemoteWriteStream {
    location: Location,
    writer: Option<BridgeWriter>,
    commit: Arc<AtomicBool>,
    done: Receiver<StorageResult<()>>,
    content_length: u64,
    written: u64,
    state: StreamState,
    abort_timeout: Duration,
}

impl RemoteWriteStream {
    /// Record the abort decision and end the upload. Does not wait.
    fn signal_abort(&mut self) {
        self.state = StreamState::Aborted;
        self.commit.store(false, Ordering::SeqCst);
        if let Some(writer) = self.writer.take() {
            writer.fail("upload aborted");
        }
    }

    /// Collect the worker's result after it stopped reading.
    fn worker_failure(&mut self, fallback: StorageError) -> StorageError {
        self.signal_abort();
        match self.done.recv() {
            Ok(Err(e)) => e,
            _ => fallback,
        }
    }
}

impl WriteStream for RemoteWriteStream {
    fn write(&mut self, data: &[u8]) -> StorageResult<usize> {
        if !self.state.is_open() {
            return Err(StorageError::StreamClosed);
        }
        let attempted = self.written + data.len() as u64;
        if attempted > self.content_length {
            self.signal_abort();
            return Err(StorageError::WriteOverflow {
                limit: self.content_length,
                attempted,
            });
        }
        let writer = self.writer.as_ref().ok_or(StorageError::StreamClosed)?;
        if let Err(e) = writer.write(Bytes::copy_from_slice(data)) {
            return Err(self.worker_failure(e));
        }
        self.written = attempted;
        Ok(data.len())
    }

    fn close(&mut self) -> StorageResult<()> {
        match self.state {
            StreamState::Committed => return Ok(()),
            StreamState::Aborted => return Err(StorageError::StreamAborted),
            StreamState::Open => {}
        }
        self.commit.store(true, Ordering::SeqCst);
        if let Some(writer) = self.writer.take() {
            writer.close();
        }
        match self.done.recv() {
            Ok(Ok(())) => {
                self.state = StreamState::Committed;
                debug!(location = %self.location, bytes = self.written, "closed blob stream");
                Ok(())
            }
            Ok(Err(e)) => {
                self.state = StreamState::Aborted;
                Err(e)
            }
            Err(_) => {
                self.state = StreamState::Aborted;
                Err(StorageError::Backend(
                    "upload worker exited without reporting".into(),
                ))
            }
        }
    }

    fn abort(&mut self) -> StorageResult<()> {
        match self.state {
            StreamState::Committed => return Err(StorageError::AbortAfterCommit),
            StreamState::Aborted => return Ok(()),
            StreamState::Open => {}
        }
        self.signal_abort();
        match self.done.recv_timeout(self.abort_timeout) {
            Ok(result) => {
                if let Err(e) = result {
                    debug!(location = %self.location, error = %e, "upload worker ended with error after abort");
                }
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(location = %self.location, timeout = ?self.abort_timeout, "upload worker did not acknowledge abort");
                Err(StorageError::AbortTimeout(self.abort_timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Ok(()),
        }
    }

    fn state(&self) -> StreamState {
        self.state
    }
}

impl Drop for RemoteWriteStream {
    fn drop(&mut self) {
        if self.state.is_open() {
            self.signal_abort();
        }
    }
}

//! Local filesystem backend.
//!
//! Layout below the root directory:
//!
//! ```text
//! <root>/<seg 1 dir>/<seg 2 dir>/.../<seg N dir>/<secured filename>
//! ```
//!
//! where each segment directory is built by
//! [`segment_dir_name`](crate::naming::segment_dir_name). Uploads are staged
//! in a hidden temporary file next to the target and renamed over it on
//! close.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use depot_types::Location;

use crate::error::{StorageError, StorageResult};
use crate::naming::{secure_filename, segment_dir_name};
use crate::traits::{ReadHandle, Storage, StreamState, WriteStream};

const URI_SCHEME: &str = "file://";

/// How often staging an upload is retried when its directory is pruned away.
const STAGE_ATTEMPTS: u32 = 16;

/// Characters accepted in location segments.
fn is_supported_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '/' | '@')
}

/// Stores files in a directory tree on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Use `root` as storage directory, creating it if necessary.
    pub fn open(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;
        let root = root.canonicalize()?;
        debug!(root = %root.display(), "opened filesystem storage");
        Ok(Self { root })
    }

    /// The canonical storage directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic path of the file for `(location, filename)`.
    pub fn path_for(&self, location: &Location, filename: &str) -> PathBuf {
        let mut path = self.root.clone();
        for segment in location.iter() {
            path.push(segment_dir_name(segment));
        }
        path.push(secure_filename(filename));
        path
    }

    fn uri_for(path: &Path) -> String {
        format!("{URI_SCHEME}{}", path.display())
    }

    /// Path a stored file lives at. A `file://` URI that diverges from the
    /// derived path wins.
    fn resolve(&self, location: &Location, filename: &str, uri: &str) -> StorageResult<PathBuf> {
        let derived = self.path_for(location, filename);
        let expected = Self::uri_for(&derived);
        if uri == expected {
            return Ok(derived);
        }
        match uri.strip_prefix(URI_SCHEME) {
            Some(path) => {
                warn!(%location, have = uri, should = %expected, "file URI deviates from derived path");
                Ok(PathBuf::from(path))
            }
            None => {
                warn!(%location, uri, "not a file:// URI");
                Err(StorageError::FileDoesNotExist(location.clone()))
            }
        }
    }

    /// Create the upload temp file in `dir`.
    ///
    /// Concurrent aborts and deletes prune empty directories, so `dir` can
    /// vanish between creating it and creating the file. Once the temp file
    /// exists the directory is no longer empty and stays put.
    fn stage_temp(&self, dir: &Path) -> StorageResult<NamedTempFile> {
        let mut attempt = 1;
        loop {
            let staged = fs::create_dir_all(dir).and_then(|()| {
                tempfile::Builder::new()
                    .prefix(".upload-")
                    .suffix(".tmp")
                    .tempfile_in(dir)
            });
            match staged {
                Ok(temp) => return Ok(temp),
                Err(e) if e.kind() == ErrorKind::NotFound && attempt < STAGE_ATTEMPTS => {
                    debug!(dir = %dir.display(), attempt, "upload directory pruned concurrently, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Remove empty directories from `dir` upwards, stopping below the root.
    fn prune_empty_dirs(&self, dir: Option<&Path>) {
        let mut current = dir;
        while let Some(dir) = current {
            if dir == self.root || !dir.starts_with(&self.root) {
                break;
            }
            if fs::remove_dir(dir).is_err() {
                break;
            }
            debug!(dir = %dir.display(), "pruned empty directory");
            current = dir.parent();
        }
    }
}

impl Storage for FsStorage {
    fn supports_location(&self, location: &Location) -> bool {
        !location.is_root() && location.validate(None, None, Some(&is_supported_char))
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
        let target = self.path_for(location, filename);
        let dir = target
            .parent()
            .ok_or_else(|| StorageError::UnsupportedLocation(location.clone()))?
            .to_path_buf();
        let temp = self.stage_temp(&dir)?;
        let uri = Self::uri_for(&target);
        debug!(%location, path = %target.display(), content_length, "opened file for writing");
        let stream = FsWriteStream {
            storage: self.clone(),
            target,
            temp: Some(temp),
            content_length,
            written: 0,
            state: StreamState::Open,
        };
        Ok((Box::new(stream), uri))
    }

    fn open_read_file(
        &self,
        location: &Location,
        filename: &str,
        uri: &str,
    ) -> StorageResult<(ReadHandle, u64)> {
        let path = self.resolve(location, filename, uri)?;
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::FileDoesNotExist(location.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        let meta = file.metadata()?;
        if !meta.is_file() {
            return Err(StorageError::FileDoesNotExist(location.clone()));
        }
        Ok((Box::new(file), meta.len()))
    }

    fn delete_file(&self, location: &Location, filename: &str, uri: &str) -> StorageResult<()> {
        let path = self.resolve(location, filename, uri)?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::FileDoesNotExist(location.clone()))
            }
            Err(e) => return Err(e.into()),
        }
        debug!(%location, path = %path.display(), "deleted file");
        self.prune_empty_dirs(path.parent());
        Ok(())
    }
}

/// Write stream backed by a temporary file in the target directory.
struct FsWriteStream {
    storage: FsStorage,
    target: PathBuf,
    temp: Option<NamedTempFile>,
    content_length: u64,
    written: u64,
    state: StreamState,
}

impl FsWriteStream {
    fn discard(&mut self) {
        self.state = StreamState::Aborted;
        if let Some(temp) = self.temp.take() {
            if let Err(e) = temp.close() {
                warn!(path = %self.target.display(), error = %e, "failed to remove temporary file");
            }
        }
        self.storage.prune_empty_dirs(self.target.parent());
    }
}

impl WriteStream for FsWriteStream {
    fn write(&mut self, data: &[u8]) -> StorageResult<usize> {
        if !self.state.is_open() {
            return Err(StorageError::StreamClosed);
        }
        let attempted = self.written + data.len() as u64;
        if attempted > self.content_length {
            self.discard();
            return Err(StorageError::WriteOverflow {
                limit: self.content_length,
                attempted,
            });
        }
        let temp = self.temp.as_mut().ok_or(StorageError::StreamClosed)?;
        temp.write_all(data)?;
        self.written = attempted;
        Ok(data.len())
    }

    fn close(&mut self) -> StorageResult<()> {
        match self.state {
            StreamState::Committed => return Ok(()),
            StreamState::Aborted => return Err(StorageError::StreamAborted),
            StreamState::Open => {}
        }
        let temp = self.temp.take().ok_or(StorageError::StreamClosed)?;
        // The temp file is deleted when dropped on any error path below.
        self.state = StreamState::Aborted;
        temp.as_file().sync_all()?;
        temp.persist(&self.target).map_err(|e| StorageError::Io(e.error))?;
        self.state = StreamState::Committed;
        debug!(path = %self.target.display(), bytes = self.written, "committed file");
        Ok(())
    }

    fn abort(&mut self) -> StorageResult<()> {
        match self.state {
            StreamState::Committed => Err(StorageError::AbortAfterCommit),
            StreamState::Aborted => Ok(()),
            StreamState::Open => {
                self.discard();
                debug!(path = %self.target.display(), "aborted file write");
                Ok(())
            }
        }
    }

    fn state(&self) -> StreamState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn loc(s: &str) -> Location {
        Location::parse(s).unwrap()
    }

    fn storage() -> (tempfile::TempDir, FsStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::open(dir.path().join("files")).unwrap();
        (dir, storage)
    }

    fn put(storage: &FsStorage, location: &Location, filename: &str, body: &[u8]) -> String {
        let (mut stream, uri) = storage
            .open_write_file(location, filename, body.len() as u64)
            .unwrap();
        stream.write(body).unwrap();
        stream.close().unwrap();
        uri
    }

    fn read_all(storage: &FsStorage, location: &Location, filename: &str, uri: &str) -> Vec<u8> {
        let (mut reader, size) = storage.open_read_file(location, filename, uri).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out.len() as u64, size);
        out
    }

    // -----------------------------------------------------------------------
    // Locations
    // -----------------------------------------------------------------------

    #[test]
    fn supported_locations() {
        let (_dir, storage) = storage();
        assert!(storage.supports_location(&loc("acme:widgets:1.0:bin")));
        assert!(storage.supports_location(&loc("user@host:lib/ssl")));
        assert!(!storage.supports_location(&Location::root()));
        assert!(!storage.supports_location(&loc("has space")));
        assert!(!storage.supports_location(&loc("ümlaut")));
    }

    #[test]
    fn unsupported_location_cannot_be_written() {
        let (_dir, storage) = storage();
        assert!(matches!(
            storage.open_write_file(&loc("bad name"), "x", 1),
            Err(StorageError::UnsupportedLocation(_))
        ));
    }

    #[test]
    fn paths_stay_below_root() {
        let (_dir, storage) = storage();
        let path = storage.path_for(&loc("..:../..:.hidden"), "../../etc/passwd");
        assert!(path.starts_with(storage.root()));
        assert!(path
            .strip_prefix(storage.root())
            .unwrap()
            .components()
            .all(|c| matches!(c, std::path::Component::Normal(_))));
    }

    #[test]
    fn uri_encodes_absolute_path() {
        let (_dir, storage) = storage();
        let location = loc("acme:widgets:1.0:bin");
        let (mut stream, uri) = storage.open_write_file(&location, "w.bin", 0).unwrap();
        stream.close().unwrap();
        let expected = storage.path_for(&location, "w.bin");
        assert_eq!(uri, format!("file://{}", expected.display()));
        assert!(expected.is_absolute());
        assert!(expected.is_file());
    }

    // -----------------------------------------------------------------------
    // Write streams
    // -----------------------------------------------------------------------

    #[test]
    fn content_is_invisible_until_close() {
        let (_dir, storage) = storage();
        let location = loc("acme:bin");
        let (mut stream, uri) = storage.open_write_file(&location, "a.txt", 5).unwrap();
        stream.write(b"hello").unwrap();
        assert!(matches!(
            storage.open_read_file(&location, "a.txt", &uri),
            Err(StorageError::FileDoesNotExist(_))
        ));
        stream.close().unwrap();
        assert_eq!(stream.state(), StreamState::Committed);
        assert_eq!(read_all(&storage, &location, "a.txt", &uri), b"hello");
    }

    #[test]
    fn abort_keeps_previous_content() {
        let (_dir, storage) = storage();
        let location = loc("acme:widgets:1.0:bin");
        let uri = put(&storage, &location, "w.bin", b"version one");

        let (mut stream, uri2) = storage.open_write_file(&location, "w.bin", 11).unwrap();
        assert_eq!(uri, uri2);
        stream.write(b"version two").unwrap();
        stream.abort().unwrap();
        assert_eq!(stream.state(), StreamState::Aborted);

        assert_eq!(read_all(&storage, &location, "w.bin", &uri), b"version one");
        let dir = storage.path_for(&location, "w.bin");
        let leftovers: Vec<_> = fs::read_dir(dir.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1, "temporary file left behind: {leftovers:?}");
    }

    #[test]
    fn close_replaces_previous_content() {
        let (_dir, storage) = storage();
        let location = loc("acme:bin");
        let uri = put(&storage, &location, "a", b"old");
        put(&storage, &location, "a", b"newer");
        assert_eq!(read_all(&storage, &location, "a", &uri), b"newer");
    }

    #[test]
    fn overflow_aborts_the_stream() {
        let (_dir, storage) = storage();
        let location = loc("acme:bin");
        let (mut stream, uri) = storage.open_write_file(&location, "a", 4).unwrap();
        stream.write(b"abc").unwrap();
        assert!(matches!(
            stream.write(b"de"),
            Err(StorageError::WriteOverflow { limit: 4, attempted: 5 })
        ));
        assert_eq!(stream.state(), StreamState::Aborted);
        assert!(matches!(stream.close(), Err(StorageError::StreamAborted)));
        assert!(matches!(
            storage.open_read_file(&location, "a", &uri),
            Err(StorageError::FileDoesNotExist(_))
        ));
    }

    #[test]
    fn state_machine_transitions() {
        let (_dir, storage) = storage();
        let location = loc("acme:bin");
        let (mut stream, _) = storage.open_write_file(&location, "a", 1).unwrap();
        stream.write(b"x").unwrap();
        stream.close().unwrap();
        stream.close().unwrap();
        assert!(matches!(stream.write(b"y"), Err(StorageError::StreamClosed)));
        assert!(matches!(stream.abort(), Err(StorageError::AbortAfterCommit)));

        let (mut stream, _) = storage.open_write_file(&location, "b", 1).unwrap();
        stream.abort().unwrap();
        stream.abort().unwrap();
        assert!(matches!(stream.write(b"y"), Err(StorageError::StreamClosed)));
    }

    #[test]
    fn dropped_stream_leaves_no_file() {
        let (_dir, storage) = storage();
        let location = loc("acme:bin");
        let (mut stream, uri) = storage.open_write_file(&location, "a", 3).unwrap();
        stream.write(b"abc").unwrap();
        drop(stream);
        assert!(storage.open_read_file(&location, "a", &uri).is_err());
    }

    // -----------------------------------------------------------------------
    // Read / delete
    // -----------------------------------------------------------------------

    #[test]
    fn divergent_file_uri_is_preferred() {
        let (dir, storage) = storage();
        let elsewhere = dir.path().join("moved.bin");
        fs::write(&elsewhere, b"moved").unwrap();
        let uri = format!("file://{}", elsewhere.display());
        assert_eq!(read_all(&storage, &loc("acme:bin"), "a", &uri), b"moved");
    }

    #[test]
    fn foreign_uri_scheme_does_not_exist() {
        let (_dir, storage) = storage();
        let location = loc("acme:bin");
        put(&storage, &location, "a", b"x");
        assert!(matches!(
            storage.open_read_file(&location, "a", "https://cdn.example.com/a"),
            Err(StorageError::FileDoesNotExist(_))
        ));
        assert!(matches!(
            storage.delete_file(&location, "a", "s3://bucket/a"),
            Err(StorageError::FileDoesNotExist(_))
        ));
    }

    #[test]
    fn delete_removes_file_and_empty_dirs() {
        let (_dir, storage) = storage();
        let location = loc("acme:widgets:1.0:bin");
        let uri = put(&storage, &location, "w.bin", b"data");
        storage.delete_file(&location, "w.bin", &uri).unwrap();
        assert!(matches!(
            storage.open_read_file(&location, "w.bin", &uri),
            Err(StorageError::FileDoesNotExist(_))
        ));
        assert!(storage.root().exists());
        assert_eq!(fs::read_dir(storage.root()).unwrap().count(), 0);
        assert!(matches!(
            storage.delete_file(&location, "w.bin", &uri),
            Err(StorageError::FileDoesNotExist(_))
        ));
    }

    #[test]
    fn concurrent_aborts_do_not_break_uploads() {
        let (_dir, storage) = storage();
        let location = loc("acme:widgets:1.0:bin");
        let workers: Vec<_> = (0..4)
            .map(|t| {
                let storage = storage.clone();
                let location = location.clone();
                std::thread::spawn(move || {
                    for i in 0..500 {
                        let name = format!("f{t}-{i}");
                        let (mut stream, _) = storage.open_write_file(&location, &name, 1).unwrap();
                        stream.abort().unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(fs::read_dir(storage.root()).unwrap().count(), 0);
    }

    #[test]
    fn delete_keeps_sibling_files() {
        let (_dir, storage) = storage();
        let a = loc("acme:widgets:1.0:bin");
        let b = loc("acme:widgets:1.0:src");
        let uri_a = put(&storage, &a, "a", b"a");
        let uri_b = put(&storage, &b, "b", b"b");
        storage.delete_file(&a, "a", &uri_a).unwrap();
        assert_eq!(read_all(&storage, &b, "b", &uri_b), b"b");
    }
}

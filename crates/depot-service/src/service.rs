//! Repository operations.
//!
//! Every operation validates the location against the repository depth and
//! the storage backend, then asks the access control policy. Metadata
//! changes run inside a single query context. Object uploads tie a storage
//! write stream to that context so that a file is only committed together
//! with its metadata row:
//!
//! 1. open the write stream
//! 2. create the metadata row
//! 3. copy the body into the stream
//! 4. close the stream
//! 5. commit the query context
//!
//! A failure in steps 2-4 aborts the stream before the context rolls back.

use std::io::Read;

use tracing::{info, warn};

use depot_meta::MetaError;
use depot_storage::{ReadHandle, StorageError, WriteGuard};
use depot_types::{Location, Metadata, ObjectInfo, Permissions, DEFAULT_MIME};

use crate::context::RepositoryContext;
use crate::error::{ServiceError, ServiceResult};
use crate::view::{public_url, Listing, LocationView, ObjectView, PutOutcome, RepositoryInfo};

/// Everything needed to store an object besides its body.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectUpload {
    pub filename: String,
    pub mime: String,
    pub metadata: Metadata,
    /// Exact size of the body in bytes.
    pub content_length: u64,
    pub update_if_exists: bool,
}

impl ObjectUpload {
    pub fn new(filename: impl Into<String>, content_length: u64) -> Self {
        Self {
            filename: filename.into(),
            mime: DEFAULT_MIME.to_string(),
            metadata: Metadata::new(),
            content_length,
            update_if_exists: false,
        }
    }

    pub fn mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = mime.into();
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn update_if_exists(mut self, update: bool) -> Self {
        self.update_if_exists = update;
        self
    }
}

/// How a client gets at an object's content.
pub enum ReadOutcome {
    /// The object lives at a public URL.
    Redirect(String),
    /// Stream the content from storage.
    Stream {
        reader: ReadHandle,
        size: u64,
        filename: String,
        mime: String,
    },
}

impl std::fmt::Debug for ReadOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Redirect(url) => f.debug_tuple("Redirect").field(url).finish(),
            Self::Stream {
                size,
                filename,
                mime,
                ..
            } => f
                .debug_struct("Stream")
                .field("size", size)
                .field("filename", filename)
                .field("mime", mime)
                .finish_non_exhaustive(),
        }
    }
}

/// Repository operations on behalf of an authenticated identity.
#[derive(Clone, Debug)]
pub struct ArtifactService {
    ctx: RepositoryContext,
}

impl ArtifactService {
    pub fn new(ctx: RepositoryContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &RepositoryContext {
        &self.ctx
    }

    fn permissions(&self, identity: Option<&str>, location: &Location) -> Permissions {
        self.ctx.access.get_permissions(identity, location)
    }

    /// Depth and storage checks shared by every location operation.
    fn check_location(&self, location: &Location) -> ServiceResult<()> {
        if location.len() > self.ctx.num_levels() {
            return Err(ServiceError::bad_request(
                location,
                "the location is deeper than the repository supports",
            ));
        }
        if !location.is_root() && !self.ctx.storage.supports_location(location) {
            return Err(StorageError::UnsupportedLocation(location.clone()).into());
        }
        Ok(())
    }

    /// Permissions for a mutating operation. Invisible locations are
    /// forbidden rather than missing.
    fn check_mutation(
        &self,
        identity: Option<&str>,
        location: &Location,
        allowed: impl Fn(&Permissions) -> bool,
    ) -> ServiceResult<()> {
        self.check_location(location)?;
        let perms = self.permissions(identity, location);
        if location.is_root() || !perms.can_read || !allowed(&perms) {
            return Err(ServiceError::PermissionDenied(location.clone()));
        }
        Ok(())
    }

    fn is_object_location(&self, location: &Location) -> bool {
        location.len() == self.ctx.num_levels()
    }

    /// Repository-wide facts. Requires read permission on the root.
    pub fn info(&self, identity: Option<&str>) -> ServiceResult<RepositoryInfo> {
        let root = Location::root();
        if !self.permissions(identity, &root).can_read {
            return Err(ServiceError::PermissionDenied(root));
        }
        Ok(RepositoryInfo {
            num_levels: self.ctx.num_levels(),
        })
    }

    /// Look up a location or object.
    ///
    /// Locations come with their children, or with their objects one level
    /// above object depth. Entries the caller cannot read are left out.
    pub fn get(&self, identity: Option<&str>, location: &Location) -> ServiceResult<Listing> {
        self.check_location(location)?;
        if !location.is_root() && !self.permissions(identity, location).can_read {
            return Err(ServiceError::NotFound(location.clone()));
        }
        let readable = |l: &Location| self.permissions(identity, l).can_read;
        let settings = &self.ctx.settings;

        let txn = self.ctx.metadata.query_context()?;
        if self.is_object_location(location) {
            let object = txn.get_object(location)?;
            return Ok(Listing::Object(ObjectView::new(&object, settings)));
        }

        let mut view = LocationView::new(&txn.get_location(location)?);
        if location.len() + 1 == self.ctx.num_levels() {
            let objects = txn
                .list_objects(location, None)?
                .iter()
                .filter(|o| readable(&o.location))
                .map(|o| ObjectView::new(o, settings))
                .collect();
            view.objects = Some(objects);
        } else {
            let children = txn
                .list_location(location, None)?
                .iter()
                .filter(|c| readable(&c.location))
                .map(LocationView::new)
                .collect();
            view.children = Some(children);
        }
        Ok(Listing::Location(view))
    }

    /// Create or update a plain location.
    pub fn put_location(
        &self,
        identity: Option<&str>,
        location: &Location,
        metadata: Metadata,
        update_if_exists: bool,
    ) -> ServiceResult<PutOutcome> {
        self.check_mutation(identity, location, |p| p.can_write)?;
        if self.is_object_location(location) {
            return Err(ServiceError::bad_request(
                location,
                "objects are stored with put_object",
            ));
        }
        let info = depot_types::LocationInfo::new(location.clone(), metadata);
        let created = depot_meta::with_query_context(&*self.ctx.metadata, |txn| {
            txn.create_location(&info, update_if_exists)
        })?;
        let outcome = PutOutcome::from_created(created);
        info!(%location, ?outcome, identity = identity.unwrap_or(""), "put location");
        Ok(outcome)
    }

    /// Store an object's file and metadata together.
    ///
    /// `body` must yield exactly `upload.content_length` bytes. On any
    /// failure neither the file nor the metadata row changes.
    pub fn put_object(
        &self,
        identity: Option<&str>,
        location: &Location,
        upload: ObjectUpload,
        body: &mut dyn Read,
    ) -> ServiceResult<PutOutcome> {
        self.check_mutation(identity, location, |p| p.can_write)?;
        if !self.is_object_location(location) {
            return Err(ServiceError::bad_request(
                location,
                "objects live at the deepest level of the repository",
            ));
        }
        if upload.filename.is_empty() || upload.mime.is_empty() {
            return Err(ServiceError::bad_request(
                location,
                "an object needs a filename and a mime type",
            ));
        }

        let storage = &self.ctx.storage;
        let (stream, uri) =
            storage.open_write_file(location, &upload.filename, upload.content_length)?;
        let mut guard = WriteGuard::new(stream);
        let mut txn = self.ctx.metadata.query_context()?;

        let info = ObjectInfo::new(
            location.clone(),
            upload.metadata,
            upload.filename,
            upload.mime,
            uri,
        );
        let staged = (|| -> ServiceResult<(bool, Option<String>)> {
            let previous_uri = match txn.get_object(location) {
                Ok(previous) => Some(previous.uri),
                Err(MetaError::LocationDoesNotExist(_)) => None,
                Err(e) => return Err(e.into()),
            };
            let created = txn.create_object(&info, upload.update_if_exists)?;
            let copied = guard.stream_mut().copy_from(body)?;
            if copied != upload.content_length {
                return Err(ServiceError::bad_request(
                    location,
                    format!(
                        "body ended after {copied} of {} bytes",
                        upload.content_length
                    ),
                ));
            }
            Ok((created, previous_uri))
        })();

        let (created, previous_uri) = match staged {
            Ok(staged) => staged,
            Err(e) => {
                if let Err(abort) = guard.abort() {
                    warn!(%location, error = %abort, "failed to abort object upload");
                }
                drop(txn);
                return Err(e);
            }
        };
        if let Err(e) = guard.close() {
            drop(txn);
            return Err(e.into());
        }
        if let Err(e) = txn.commit() {
            // The rolled-back record still points at its own file; only a
            // file nothing refers to is removed.
            if previous_uri.as_deref() == Some(info.uri.as_str()) {
                warn!(%location, uri = %info.uri, "metadata commit failed after the file was replaced");
            } else if let Err(cleanup) = storage.delete_file(location, &info.filename, &info.uri) {
                warn!(%location, error = %cleanup, "failed to remove file after metadata commit failure");
            }
            return Err(e.into());
        }

        let outcome = PutOutcome::from_created(created);
        info!(
            %location,
            ?outcome,
            filename = %info.filename,
            bytes = upload.content_length,
            identity = identity.unwrap_or(""),
            "put object"
        );
        Ok(outcome)
    }

    /// Delete a location or object and the files of every object below it.
    ///
    /// Returns the removed objects. File cleanup happens after the metadata
    /// commit; failures there are logged and do not fail the call.
    pub fn delete(
        &self,
        identity: Option<&str>,
        location: &Location,
        recursive: bool,
    ) -> ServiceResult<Vec<ObjectInfo>> {
        self.check_mutation(identity, location, |p| p.can_delete)?;
        let removed = depot_meta::with_query_context(&*self.ctx.metadata, |txn| {
            txn.delete_location(location, recursive)
        })?;

        for object in &removed {
            match self
                .ctx
                .storage
                .delete_file(&object.location, &object.filename, &object.uri)
            {
                Ok(()) => {}
                Err(StorageError::FileDoesNotExist(_)) => {
                    warn!(location = %object.location, uri = %object.uri, "file of deleted object does not exist");
                }
                Err(e) => {
                    warn!(location = %object.location, uri = %object.uri, error = %e, "failed to delete file of deleted object");
                }
            }
        }
        info!(%location, recursive, objects = removed.len(), identity = identity.unwrap_or(""), "deleted location");
        Ok(removed)
    }

    /// Fetch an object's content, or where to find it.
    pub fn read(&self, identity: Option<&str>, location: &Location) -> ServiceResult<ReadOutcome> {
        if !self.is_object_location(location) || !self.permissions(identity, location).can_read {
            return Err(ServiceError::NotFound(location.clone()));
        }
        let object = {
            let txn = self.ctx.metadata.query_context()?;
            match txn.get_object(location) {
                Ok(object) => object,
                Err(MetaError::LocationDoesNotExist(_)) => {
                    return Err(ServiceError::NotFound(location.clone()))
                }
                Err(e) => return Err(e.into()),
            }
        };

        if let Some(url) = public_url(&object, &self.ctx.settings) {
            return Ok(ReadOutcome::Redirect(url.to_string()));
        }
        let (reader, size) =
            self.ctx
                .storage
                .open_read_file(location, &object.filename, &object.uri)?;
        Ok(ReadOutcome::Stream {
            reader,
            size,
            filename: object.filename,
            mime: object.mime,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use depot_access::{FixedAccessControl, UserSpaceAccessControl};
    use depot_meta::TreeMetadataStore;
    use depot_storage::{FsStorage, InMemoryBlobService, RemoteBlobStorage};
    use std::sync::Arc;

    fn loc(s: &str) -> Location {
        Location::parse(s).unwrap()
    }

    fn fs_service(levels: usize) -> (tempfile::TempDir, ArtifactService) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RepositoryContext::new(
            Arc::new(TreeMetadataStore::new(levels).unwrap()),
            Arc::new(FsStorage::open(dir.path()).unwrap()),
            Arc::new(UserSpaceAccessControl::default()),
        );
        (dir, ArtifactService::new(ctx))
    }

    #[test]
    fn info_needs_root_read() {
        let (_dir, service) = fs_service(2);
        assert_eq!(service.info(None).unwrap().num_levels, 2);

        let denied = ArtifactService::new(RepositoryContext::new(
            Arc::new(TreeMetadataStore::new(2).unwrap()),
            Arc::new(RemoteBlobStorage::new(Arc::new(InMemoryBlobService::default()))),
            Arc::new(FixedAccessControl::deny_all()),
        ));
        assert_eq!(denied.info(Some("acme")).unwrap_err().kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn too_deep_is_bad_request() {
        let (_dir, service) = fs_service(2);
        let err = service.get(None, &loc("a:b:c")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn unsupported_characters_are_bad_request() {
        let (_dir, service) = fs_service(2);
        let err = service
            .put_location(Some("acme"), &loc("acme corp"), Metadata::new(), false)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Storage(StorageError::UnsupportedLocation(_))));
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn root_cannot_be_written_or_deleted() {
        let (_dir, service) = fs_service(2);
        assert_eq!(
            service
                .put_location(Some("acme"), &Location::root(), Metadata::new(), true)
                .unwrap_err()
                .kind(),
            ErrorKind::Forbidden
        );
        assert_eq!(
            service.delete(Some("acme"), &Location::root(), true).unwrap_err().kind(),
            ErrorKind::Forbidden
        );
    }

    #[test]
    fn put_location_reports_created_then_updated() {
        let (_dir, service) = fs_service(3);
        let acme = loc("acme");
        assert_eq!(
            service.put_location(Some("acme"), &acme, Metadata::new(), false).unwrap(),
            PutOutcome::Created
        );
        assert_eq!(
            service
                .put_location(Some("acme"), &acme, Metadata::new(), false)
                .unwrap_err()
                .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            service.put_location(Some("acme"), &acme, Metadata::new(), true).unwrap(),
            PutOutcome::Updated
        );
    }

    #[test]
    fn object_depth_is_enforced_both_ways() {
        let (_dir, service) = fs_service(2);
        service
            .put_location(Some("acme"), &loc("acme"), Metadata::new(), false)
            .unwrap();
        let err = service
            .put_location(Some("acme"), &loc("acme:bin"), Metadata::new(), false)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        let err = service
            .put_object(Some("acme"), &loc("acme"), ObjectUpload::new("a", 0), &mut &b""[..])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn short_body_is_rejected_and_rolled_back() {
        let (dir, service) = fs_service(2);
        service
            .put_location(Some("acme"), &loc("acme"), Metadata::new(), false)
            .unwrap();
        let err = service
            .put_object(
                Some("acme"),
                &loc("acme:bin"),
                ObjectUpload::new("a.bin", 10),
                &mut &b"short"[..],
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert!(matches!(
            service.read(Some("acme"), &loc("acme:bin")),
            Err(ServiceError::NotFound(_))
        ));
        let files: Vec<_> = walk(dir.path());
        assert!(files.is_empty(), "unexpected files: {files:?}");
    }

    /// A store whose snapshot writes start failing once `break_snapshots`
    /// turns the snapshot directory into a plain file.
    fn snapshot_service(dir: &std::path::Path) -> (ArtifactService, impl Fn()) {
        let meta_dir = dir.join("meta");
        std::fs::create_dir(&meta_dir).unwrap();
        let ctx = RepositoryContext::new(
            Arc::new(TreeMetadataStore::open(2, meta_dir.join("meta.json")).unwrap()),
            Arc::new(FsStorage::open(dir.join("files")).unwrap()),
            Arc::new(UserSpaceAccessControl::default()),
        );
        let break_snapshots = move || {
            std::fs::remove_dir_all(&meta_dir).unwrap();
            std::fs::write(&meta_dir, b"not a directory").unwrap();
        };
        (ArtifactService::new(ctx), break_snapshots)
    }

    #[test]
    fn failed_commit_of_update_keeps_referenced_file() {
        let dir = tempfile::tempdir().unwrap();
        let (service, break_snapshots) = snapshot_service(dir.path());
        let bin = loc("acme:bin");
        service.put_location(Some("acme"), &loc("acme"), Metadata::new(), false).unwrap();
        service
            .put_object(Some("acme"), &bin, ObjectUpload::new("a.bin", 2), &mut &b"v1"[..])
            .unwrap();

        break_snapshots();
        let update = ObjectUpload::new("a.bin", 2).update_if_exists(true);
        let err = service
            .put_object(Some("acme"), &bin, update, &mut &b"v2"[..])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);

        match service.read(Some("acme"), &bin).unwrap() {
            ReadOutcome::Stream { mut reader, .. } => {
                let mut data = Vec::new();
                reader.read_to_end(&mut data).unwrap();
                assert_eq!(data.len(), 2);
            }
            other => panic!("expected a stream, got {other:?}"),
        }
    }

    #[test]
    fn failed_commit_of_new_object_removes_its_file() {
        let dir = tempfile::tempdir().unwrap();
        let (service, break_snapshots) = snapshot_service(dir.path());
        service.put_location(Some("acme"), &loc("acme"), Metadata::new(), false).unwrap();

        break_snapshots();
        let err = service
            .put_object(Some("acme"), &loc("acme:bin"), ObjectUpload::new("a.bin", 2), &mut &b"v1"[..])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(walk(&dir.path().join("files")).is_empty());
        assert!(matches!(
            service.read(Some("acme"), &loc("acme:bin")),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn web_uri_objects_redirect() {
        let blobs = Arc::new(InMemoryBlobService::new("https://cdn.example.com"));
        let service = ArtifactService::new(RepositoryContext::new(
            Arc::new(TreeMetadataStore::new(2).unwrap()),
            Arc::new(RemoteBlobStorage::new(blobs)),
            Arc::new(FixedAccessControl::allow_all()),
        ));
        service.put_location(Some("acme"), &loc("acme"), Metadata::new(), false).unwrap();
        service
            .put_object(
                Some("acme"),
                &loc("acme:bin"),
                ObjectUpload::new("w.bin", 3),
                &mut &b"abc"[..],
            )
            .unwrap();
        match service.read(None, &loc("acme:bin")).unwrap() {
            ReadOutcome::Redirect(url) => {
                assert_eq!(url, "https://cdn.example.com/data/acme/bin/w.bin")
            }
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    /// Regular files below `root`, recursively.
    fn walk(root: &std::path::Path) -> Vec<std::path::PathBuf> {
        let mut out = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(&dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    out.push(path);
                }
            }
        }
        out
    }
}

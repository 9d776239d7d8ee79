//! The [`MetadataStore`] contract.
//!
//! Any backend (in-memory, relational, ...) implements these traits to
//! provide the location hierarchy. Callers never touch the store directly:
//! they open a query context and run every operation through it.

use depot_types::{Filter, Location, LocationInfo, ObjectInfo};

use crate::error::{MetaError, MetaResult};

/// A hierarchical location/object database.
///
/// Implementations must be thread-safe and must isolate query contexts from
/// each other: a scope never observes writes of another scope that has not
/// committed yet.
pub trait MetadataStore: Send + Sync {
    /// Number of levels supported. Fixed for the lifetime of the store.
    fn num_levels(&self) -> usize;

    /// Open a transactional query context.
    ///
    /// Changes made through the returned handle are persisted by
    /// [`MetadataTxn::commit`] and rolled back when the handle is dropped
    /// without committing.
    fn query_context(&self) -> MetaResult<Box<dyn MetadataTxn + '_>>;
}

/// Operations available inside a query context.
pub trait MetadataTxn {
    /// Number of levels supported by the owning store.
    fn num_levels(&self) -> usize;

    /// Read a plain location. The depth must be below `num_levels`.
    fn get_location(&self, location: &Location) -> MetaResult<LocationInfo>;

    /// Read an object. The depth must equal `num_levels`.
    fn get_object(&self, location: &Location) -> MetaResult<ObjectInfo>;

    /// List the children of a plain location.
    fn list_location(
        &self,
        location: &Location,
        filter: Option<&Filter>,
    ) -> MetaResult<Vec<LocationInfo>>;

    /// List objects at `location`.
    ///
    /// At depth `num_levels` this yields the object itself (zero or one
    /// result); at depth `num_levels - 1` it yields all object children. Any
    /// other depth is an [`MetaError::InvalidLocationQuery`].
    fn list_objects(
        &self,
        location: &Location,
        filter: Option<&Filter>,
    ) -> MetaResult<Vec<ObjectInfo>>;

    /// Create, or with `update_if_exists` update, a plain location.
    ///
    /// Returns `true` if the location was newly created, `false` if it was
    /// updated. The root always exists and can only be updated.
    fn create_location(&mut self, info: &LocationInfo, update_if_exists: bool) -> MetaResult<bool>;

    /// Create, or with `update_if_exists` update, an object.
    ///
    /// Returns `true` if the object was newly created.
    fn create_object(&mut self, info: &ObjectInfo, update_if_exists: bool) -> MetaResult<bool>;

    /// Delete a location (or object) and return every object removed with it.
    ///
    /// Deleting the root removes its children but keeps the root itself.
    fn delete_location(&mut self, location: &Location, recursive: bool)
        -> MetaResult<Vec<ObjectInfo>>;

    /// Persist every change made through this handle.
    fn commit(self: Box<Self>) -> MetaResult<()>;
}

/// Run `f` inside a query context of `store`.
///
/// Commits when `f` returns `Ok`; when it returns `Err` the context is
/// dropped and all of its changes are rolled back.
pub fn with_query_context<T, E, F>(store: &dyn MetadataStore, f: F) -> Result<T, E>
where
    F: FnOnce(&mut dyn MetadataTxn) -> Result<T, E>,
    E: From<MetaError>,
{
    let mut txn = store.query_context()?;
    let value = f(&mut *txn)?;
    txn.commit()?;
    Ok(value)
}

use depot_types::Location;

/// Errors from metadata store operations.
#[derive(Debug, thiserror::Error)]
pub enum MetaError {
    /// The node, or the parent required to create it, does not exist.
    #[error("location does not exist: {0}")]
    LocationDoesNotExist(Location),

    /// A create call hit an existing node without `update_if_exists`.
    #[error("location already exists: {0}")]
    LocationAlreadyExists(Location),

    /// A non-recursive delete hit a node with children.
    #[error("location has children: {0}")]
    LocationHasChildren(Location),

    /// The location depth does not fit the requested operation.
    #[error("invalid location query: {0:?}")]
    InvalidLocationQuery(Location),

    /// The store was configured with an unusable number of levels.
    #[error("invalid number of levels: {0}")]
    InvalidLevels(usize),

    /// The persisted snapshot could not be encoded or decoded.
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// I/O error while reading or writing the snapshot.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MetaError {
    /// The location the error is about, if any.
    pub fn location(&self) -> Option<&Location> {
        match self {
            Self::LocationDoesNotExist(loc)
            | Self::LocationAlreadyExists(loc)
            | Self::LocationHasChildren(loc)
            | Self::InvalidLocationQuery(loc) => Some(loc),
            _ => None,
        }
    }
}

/// Result alias for metadata store operations.
pub type MetaResult<T> = Result<T, MetaError>;

use depot_meta::MetaError;
use depot_storage::StorageError;
use depot_types::Location;

/// Errors from repository operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Meta(#[from] MetaError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The caller lacks the permission the operation needs.
    #[error("permission denied: {0}")]
    PermissionDenied(Location),

    /// Nothing the caller may see exists at the location.
    #[error("not found: {0}")]
    NotFound(Location),

    /// The request cannot apply to the location.
    #[error("bad request at {location:?}: {message}")]
    BadRequest { location: Location, message: String },

    /// The configuration is unusable.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error classes a transport maps onto its status codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    BadRequest,
    Forbidden,
    PayloadTooLarge,
    Internal,
}

impl ServiceError {
    pub(crate) fn bad_request(location: &Location, message: impl Into<String>) -> Self {
        Self::BadRequest {
            location: location.clone(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Meta(e) => match e {
                MetaError::LocationDoesNotExist(_) => ErrorKind::NotFound,
                MetaError::LocationAlreadyExists(_) | MetaError::LocationHasChildren(_) => {
                    ErrorKind::Conflict
                }
                MetaError::InvalidLocationQuery(_) => ErrorKind::BadRequest,
                MetaError::InvalidLevels(_) | MetaError::Snapshot(_) | MetaError::Io(_) => {
                    ErrorKind::Internal
                }
            },
            Self::Storage(e) => match e {
                StorageError::WriteOverflow { .. } => ErrorKind::PayloadTooLarge,
                StorageError::FileDoesNotExist(_) => ErrorKind::NotFound,
                StorageError::UnsupportedLocation(_) => ErrorKind::BadRequest,
                _ => ErrorKind::Internal,
            },
            Self::PermissionDenied(_) => ErrorKind::Forbidden,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::BadRequest { .. } => ErrorKind::BadRequest,
            Self::Config(_) | Self::Io(_) => ErrorKind::Internal,
        }
    }

    /// Short machine-readable status name.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Meta(MetaError::LocationDoesNotExist(_)) | Self::NotFound(_) => {
                "LocationDoesNotExist"
            }
            Self::Meta(MetaError::LocationAlreadyExists(_)) => "LocationAlreadyExists",
            Self::Meta(MetaError::LocationHasChildren(_)) => "LocationHasChildren",
            Self::Storage(StorageError::FileDoesNotExist(_)) => "FileDoesNotExist",
            Self::PermissionDenied(_) => "PermissionDenied",
            Self::Meta(MetaError::InvalidLocationQuery(_))
            | Self::Storage(StorageError::UnsupportedLocation(_))
            | Self::Storage(StorageError::WriteOverflow { .. })
            | Self::BadRequest { .. } => "BadRequest",
            _ => "InternalError",
        }
    }

    /// The location the error refers to, if any.
    pub fn location(&self) -> Option<&Location> {
        match self {
            Self::Meta(e) => e.location(),
            Self::Storage(StorageError::FileDoesNotExist(l))
            | Self::Storage(StorageError::UnsupportedLocation(l))
            | Self::PermissionDenied(l)
            | Self::NotFound(l)
            | Self::BadRequest { location: l, .. } => Some(l),
            _ => None,
        }
    }
}

/// Result alias for repository operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(s: &str) -> Location {
        Location::parse(s).unwrap()
    }

    #[test]
    fn taxonomy() {
        let l = loc("acme");
        let cases = [
            (ServiceError::from(MetaError::LocationDoesNotExist(l.clone())), ErrorKind::NotFound),
            (MetaError::LocationAlreadyExists(l.clone()).into(), ErrorKind::Conflict),
            (MetaError::LocationHasChildren(l.clone()).into(), ErrorKind::Conflict),
            (MetaError::InvalidLocationQuery(l.clone()).into(), ErrorKind::BadRequest),
            (
                StorageError::WriteOverflow { limit: 1, attempted: 2 }.into(),
                ErrorKind::PayloadTooLarge,
            ),
            (StorageError::FileDoesNotExist(l.clone()).into(), ErrorKind::NotFound),
            (StorageError::UnsupportedLocation(l.clone()).into(), ErrorKind::BadRequest),
            (StorageError::StreamAborted.into(), ErrorKind::Internal),
            (ServiceError::PermissionDenied(l.clone()), ErrorKind::Forbidden),
            (ServiceError::bad_request(&l, "nope"), ErrorKind::BadRequest),
        ];
        for (err, kind) in cases {
            assert_eq!(err.kind(), kind, "{err}");
        }
    }

    #[test]
    fn status_and_location() {
        let err = ServiceError::from(MetaError::LocationHasChildren(loc("acme:widgets")));
        assert_eq!(err.status(), "LocationHasChildren");
        assert_eq!(err.location(), Some(&loc("acme:widgets")));
        assert_eq!(ServiceError::Config("x".into()).status(), "InternalError");
        assert_eq!(ServiceError::Config("x".into()).location(), None);
    }
}

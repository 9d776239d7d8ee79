use serde::{Deserialize, Serialize};

use depot_types::{Location, Permissions};

use crate::traits::{authenticated, is_owner, AccessControl};

/// Full permissions inside the caller's own namespace.
///
/// A namespace is every location whose first segment is the identity or
/// starts with `<identity>.`. Outside of it callers can read, or nothing at
/// all when `isolate` is set. The root is readable by everyone and writable
/// by nobody.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSpaceAccessControl {
    #[serde(default)]
    pub isolate: bool,
}

impl UserSpaceAccessControl {
    pub fn new(isolate: bool) -> Self {
        Self { isolate }
    }
}

impl AccessControl for UserSpaceAccessControl {
    fn get_permissions(&self, identity: Option<&str>, location: &Location) -> Permissions {
        if location.is_root() || authenticated(identity).is_none() {
            return Permissions::read_only();
        }
        if is_owner(identity, location) {
            Permissions::allow_all()
        } else if self.isolate {
            Permissions::deny_all()
        } else {
            Permissions::read_only()
        }
    }
}

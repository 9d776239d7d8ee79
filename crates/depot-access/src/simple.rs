use serde::{Deserialize, Serialize};

use depot_types::{Location, Permissions};

use crate::traits::{authenticated, is_owner, AccessControl};

/// Authenticated callers get full access, anonymous callers read.
///
/// With `enforce_prefix`, full access is limited to the caller's own
/// namespace as in [`UserSpaceAccessControl`](crate::UserSpaceAccessControl).
/// Denied callers fall back to read-only, or to nothing with `isolate`. The
/// root is read-only for everyone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleAccessControl {
    #[serde(default = "default_enforce_prefix")]
    pub enforce_prefix: bool,
    #[serde(default)]
    pub isolate: bool,
}

fn default_enforce_prefix() -> bool {
    true
}

impl SimpleAccessControl {
    pub fn new(enforce_prefix: bool, isolate: bool) -> Self {
        Self {
            enforce_prefix,
            isolate,
        }
    }

    fn fallback(&self) -> Permissions {
        if self.isolate {
            Permissions::deny_all()
        } else {
            Permissions::read_only()
        }
    }
}

impl Default for SimpleAccessControl {
    fn default() -> Self {
        Self::new(default_enforce_prefix(), false)
    }
}

impl AccessControl for SimpleAccessControl {
    fn get_permissions(&self, identity: Option<&str>, location: &Location) -> Permissions {
        if location.is_root() {
            return Permissions::read_only();
        }
        if authenticated(identity).is_none() {
            return self.fallback();
        }
        if self.enforce_prefix && !is_owner(identity, location) {
            return self.fallback();
        }
        Permissions::allow_all()
    }
}

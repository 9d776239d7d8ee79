use serde::{Deserialize, Serialize};

/// What an identity may do at a location.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permissions {
    pub can_read: bool,
    pub can_write: bool,
    pub can_delete: bool,
}

impl Permissions {
    pub const fn allow_all() -> Self {
        Self {
            can_read: true,
            can_write: true,
            can_delete: true,
        }
    }

    pub const fn deny_all() -> Self {
        Self {
            can_read: false,
            can_write: false,
            can_delete: false,
        }
    }

    pub const fn read_only() -> Self {
        Self {
            can_read: true,
            can_write: false,
            can_delete: false,
        }
    }
}

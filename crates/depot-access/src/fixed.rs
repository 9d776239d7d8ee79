use serde::{Deserialize, Serialize};

use depot_types::{Location, Permissions};

use crate::traits::AccessControl;

/// Grants the same permissions to every identity at every location.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedAccessControl(pub Permissions);

impl FixedAccessControl {
    pub const fn allow_all() -> Self {
        Self(Permissions::allow_all())
    }

    pub const fn deny_all() -> Self {
        Self(Permissions::deny_all())
    }

    pub const fn read_only() -> Self {
        Self(Permissions::read_only())
    }
}

impl AccessControl for FixedAccessControl {
    fn get_permissions(&self, _identity: Option<&str>, _location: &Location) -> Permissions {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_answer_everywhere() {
        let location = Location::parse("acme:widgets").unwrap();
        for ac in [
            FixedAccessControl::allow_all(),
            FixedAccessControl::deny_all(),
            FixedAccessControl::read_only(),
        ] {
            assert_eq!(ac.get_permissions(None, &location), ac.0);
            assert_eq!(ac.get_permissions(Some("acme"), &Location::root()), ac.0);
        }
    }
}

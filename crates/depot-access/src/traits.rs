use depot_types::{Location, Permissions};

/// Decides what an identity may do at a location.
pub trait AccessControl: Send + Sync {
    /// Permissions of `identity` at `location`. `None` and `Some("")` are
    /// both anonymous.
    fn get_permissions(&self, identity: Option<&str>, location: &Location) -> Permissions;

    /// Permissions at the one-segment location `group`.
    fn get_group_permissions(&self, identity: Option<&str>, group: &str) -> Permissions {
        match Location::new([group]) {
            Ok(location) => self.get_permissions(identity, &location),
            Err(_) => Permissions::deny_all(),
        }
    }

    /// Permissions at the two-segment location `group:artifact`.
    fn get_artifact_permissions(
        &self,
        identity: Option<&str>,
        group: &str,
        artifact: &str,
    ) -> Permissions {
        match Location::new([group, artifact]) {
            Ok(location) => self.get_permissions(identity, &location),
            Err(_) => Permissions::deny_all(),
        }
    }
}

/// Normalize an identity: the empty string is anonymous.
pub(crate) fn authenticated(identity: Option<&str>) -> Option<&str> {
    identity.filter(|id| !id.is_empty())
}

/// Whether `identity` owns `location`: its first segment is the identity
/// itself or starts with `<identity>.`.
pub fn is_owner(identity: Option<&str>, location: &Location) -> bool {
    let (Some(identity), Some(first)) = (authenticated(identity), location.first()) else {
        return false;
    };
    first
        .strip_prefix(identity)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(s: &str) -> Location {
        Location::parse(s).unwrap()
    }

    #[test]
    fn ownership_by_first_segment() {
        assert!(is_owner(Some("acme"), &loc("acme")));
        assert!(is_owner(Some("acme"), &loc("acme.tools:cli")));
        assert!(!is_owner(Some("acme"), &loc("acmecorp")));
        assert!(!is_owner(Some("acme"), &loc("tools:acme")));
        assert!(!is_owner(Some("acme"), &Location::root()));
        assert!(!is_owner(None, &loc("acme")));
        assert!(!is_owner(Some(""), &loc("acme")));
    }

    struct OwnerOnly;

    impl AccessControl for OwnerOnly {
        fn get_permissions(&self, identity: Option<&str>, location: &Location) -> Permissions {
            if is_owner(identity, location) {
                Permissions::allow_all()
            } else {
                Permissions::deny_all()
            }
        }
    }

    #[test]
    fn group_and_artifact_helpers_build_locations() {
        let ac = OwnerOnly;
        assert!(ac.get_group_permissions(Some("acme"), "acme").can_write);
        assert!(ac.get_artifact_permissions(Some("acme"), "acme", "widgets").can_write);
        assert!(!ac.get_artifact_permissions(Some("acme"), "other", "widgets").can_read);
        assert_eq!(
            ac.get_group_permissions(Some("acme"), "acme:sneaky"),
            Permissions::deny_all()
        );
        assert_eq!(
            ac.get_artifact_permissions(Some("acme"), "acme", ""),
            Permissions::deny_all()
        );
    }
}

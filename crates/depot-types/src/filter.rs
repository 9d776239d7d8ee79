use serde::{Deserialize, Serialize};

/// Optional predicates for listing queries.
///
/// A store may skip criteria it cannot evaluate efficiently and return more
/// results than match, but it must never drop a result that does match.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Node name must start with this prefix.
    pub startswith: Option<String>,
    /// Node name must end with this suffix.
    pub endswith: Option<String>,
    /// Node name must contain this substring.
    pub contains: Option<String>,
    /// Node must be, or have below it, an object whose name is this tag.
    pub has_object: Option<String>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn startswith(mut self, prefix: impl Into<String>) -> Self {
        self.startswith = Some(prefix.into());
        self
    }

    pub fn endswith(mut self, suffix: impl Into<String>) -> Self {
        self.endswith = Some(suffix.into());
        self
    }

    pub fn contains(mut self, needle: impl Into<String>) -> Self {
        self.contains = Some(needle.into());
        self
    }

    pub fn has_object(mut self, tag: impl Into<String>) -> Self {
        self.has_object = Some(tag.into());
        self
    }

    /// Returns `true` if no criterion is set.
    pub fn is_empty(&self) -> bool {
        self.startswith.is_none()
            && self.endswith.is_none()
            && self.contains.is_none()
            && self.has_object.is_none()
    }

    /// Evaluate the name-based criteria against a node name.
    pub fn matches_name(&self, name: &str) -> bool {
        self.startswith.as_deref().map_or(true, |p| name.starts_with(p))
            && self.endswith.as_deref().map_or(true, |s| name.ends_with(s))
            && self.contains.as_deref().map_or(true, |c| name.contains(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_matches_everything() {
        let f = Filter::new();
        assert!(f.is_empty());
        assert!(f.matches_name("anything"));
    }

    #[test]
    fn name_predicates_combine() {
        let f = Filter::new().startswith("lib").endswith(".so").contains("ssl");
        assert!(!f.is_empty());
        assert!(f.matches_name("libssl.so"));
        assert!(!f.matches_name("libcrypto.so"));
        assert!(!f.matches_name("openssl.so"));
        assert!(!f.matches_name("libssl.a"));
    }

    #[test]
    fn has_object_is_not_a_name_predicate() {
        let f = Filter::new().has_object("bin");
        assert!(!f.is_empty());
        assert!(f.matches_name("whatever"));
    }
}

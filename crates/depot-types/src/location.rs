//! Hierarchical repository paths.
//!
//! A [`Location`] is an ordered list of non-empty string segments. Its string
//! form joins the segments with [`SEPARATOR`]; the empty string is the root.
//! Segments may contain any character except the separator, so backends that
//! need a narrower alphabet check it with [`Location::validate`].

use std::fmt;
use std::ops::Index;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The reserved segment separator.
pub const SEPARATOR: char = ':';

/// A path into the repository hierarchy.
///
/// The root location has no segments. A location with `n` segments sits at
/// depth `n`; the metadata store decides which depths hold plain locations
/// and which hold objects.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Location {
    parts: Vec<String>,
}

impl Location {
    /// The root location.
    pub const fn root() -> Self {
        Self { parts: Vec::new() }
    }

    /// Build a location from explicit segments.
    ///
    /// Fails if any segment is empty or contains the separator.
    pub fn new<I, S>(segments: I) -> Result<Self, TypeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parts: Vec<String> = segments.into_iter().map(Into::into).collect();
        for part in &parts {
            check_segment(part, &parts)?;
        }
        Ok(Self { parts })
    }

    /// Parse a `:`-delimited location string. The empty string is the root.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        if s.is_empty() {
            return Ok(Self::root());
        }
        let parts: Vec<String> = s.split(SEPARATOR).map(str::to_string).collect();
        if parts.iter().any(String::is_empty) {
            return Err(TypeError::EmptySegment {
                location: s.to_string(),
            });
        }
        Ok(Self { parts })
    }

    /// Number of segments (the depth of this location).
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Returns `true` for the root location.
    pub fn is_root(&self) -> bool {
        self.parts.is_empty()
    }

    /// Alias of [`Location::is_root`] for slice-like call sites.
    pub fn is_empty(&self) -> bool {
        self.is_root()
    }

    /// Segment at `index`, if present.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.parts.get(index).map(String::as_str)
    }

    /// The first segment (the "group" in a group/artifact/version/tag layout).
    pub fn first(&self) -> Option<&str> {
        self.get(0)
    }

    /// The last segment, i.e. the node's own name. `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.parts.last().map(String::as_str)
    }

    pub fn segments(&self) -> &[String] {
        &self.parts
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(String::as_str)
    }

    /// Return a new location with `segments` appended.
    pub fn append<I, S>(&self, segments: I) -> Result<Self, TypeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parts = self.parts.clone();
        parts.extend(segments.into_iter().map(Into::into));
        for part in &parts[self.parts.len()..] {
            check_segment(part, &parts)?;
        }
        Ok(Self { parts })
    }

    /// Return a new location with a single segment appended.
    pub fn child(&self, name: &str) -> Result<Self, TypeError> {
        self.append([name])
    }

    /// The parent location. The root is its own parent.
    pub fn parent(&self) -> Self {
        match self.parts.split_last() {
            Some((_, rest)) => Self {
                parts: rest.to_vec(),
            },
            None => Self::root(),
        }
    }

    /// The first `depth` segments of this location.
    pub fn truncate(&self, depth: usize) -> Self {
        Self {
            parts: self.parts.iter().take(depth).cloned().collect(),
        }
    }

    /// Check every segment against backend-specific restrictions.
    ///
    /// Segments must always be non-empty and separator-free. Lengths are
    /// counted in characters. When `allowed` is given, every character of
    /// every segment must satisfy it.
    pub fn validate(
        &self,
        min_len: Option<usize>,
        max_len: Option<usize>,
        allowed: Option<&dyn Fn(char) -> bool>,
    ) -> bool {
        self.parts.iter().all(|part| {
            let len = part.chars().count();
            len > 0
                && !part.contains(SEPARATOR)
                && min_len.map_or(true, |min| len >= min)
                && max_len.map_or(true, |max| len <= max)
                && allowed.map_or(true, |ok| part.chars().all(ok))
        })
    }
}

fn check_segment(part: &str, all: &[String]) -> Result<(), TypeError> {
    if part.is_empty() {
        return Err(TypeError::EmptySegment {
            location: all.join(":"),
        });
    }
    if part.contains(SEPARATOR) {
        return Err(TypeError::SeparatorInSegment {
            segment: part.to_string(),
        });
    }
    Ok(())
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                write!(f, "{SEPARATOR}")?;
            }
            f.write_str(part)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Location({self})")
    }
}

impl FromStr for Location {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Location {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Location> for String {
    fn from(location: Location) -> Self {
        location.to_string()
    }
}

impl Index<usize> for Location {
    type Output = str;

    fn index(&self, index: usize) -> &str {
        &self.parts[index]
    }
}

impl<'a> IntoIterator for &'a Location {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.parts.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn loc(s: &str) -> Location {
        Location::parse(s).unwrap()
    }

    #[test]
    fn empty_string_is_root() {
        let root = loc("");
        assert!(root.is_root());
        assert_eq!(root.len(), 0);
        assert_eq!(root, Location::root());
        assert_eq!(root.to_string(), "");
    }

    #[test]
    fn parse_and_display() {
        let l = loc("acme:widgets:1.0:bin");
        assert_eq!(l.len(), 4);
        assert_eq!(&l[0], "acme");
        assert_eq!(l.get(3), Some("bin"));
        assert_eq!(l.get(4), None);
        assert_eq!(l.to_string(), "acme:widgets:1.0:bin");
    }

    #[test]
    fn parse_rejects_empty_segments() {
        assert!(Location::parse("a::b").is_err());
        assert!(Location::parse(":a").is_err());
        assert!(Location::parse("a:").is_err());
    }

    #[test]
    fn new_rejects_separator_in_segment() {
        let err = Location::new(["ok", "bad:part"]).unwrap_err();
        assert_eq!(
            err,
            TypeError::SeparatorInSegment {
                segment: "bad:part".into()
            }
        );
        assert!(Location::new(["ok", ""]).is_err());
    }

    #[test]
    fn segments_may_contain_slashes() {
        let l = Location::new(["org/team", "lib"]).unwrap();
        assert_eq!(l.to_string(), "org/team:lib");
        assert_eq!(loc("org/team:lib"), l);
    }

    #[test]
    fn parent_drops_last_segment() {
        assert_eq!(loc("a:b:c").parent(), loc("a:b"));
        assert_eq!(loc("a").parent(), Location::root());
        assert_eq!(Location::root().parent(), Location::root());
    }

    #[test]
    fn append_returns_new_location() {
        let base = loc("a");
        let extended = base.append(["b", "c"]).unwrap();
        assert_eq!(extended, loc("a:b:c"));
        assert_eq!(base, loc("a"));
        assert!(base.append(["x:y"]).is_err());
        assert_eq!(base.child("z").unwrap(), loc("a:z"));
    }

    #[test]
    fn name_and_first() {
        let l = loc("acme:widgets");
        assert_eq!(l.first(), Some("acme"));
        assert_eq!(l.name(), Some("widgets"));
        assert_eq!(Location::root().name(), None);
    }

    #[test]
    fn truncate_keeps_prefix() {
        assert_eq!(loc("a:b:c").truncate(2), loc("a:b"));
        assert_eq!(loc("a:b").truncate(5), loc("a:b"));
    }

    #[test]
    fn validate_lengths_and_charset() {
        let l = loc("abc:de");
        assert!(l.validate(None, None, None));
        assert!(l.validate(Some(2), Some(3), None));
        assert!(!l.validate(Some(3), None, None));
        assert!(!l.validate(None, Some(2), None));

        let lower = |c: char| c.is_ascii_lowercase();
        assert!(l.validate(None, None, Some(&lower)));
        assert!(!loc("aBc").validate(None, None, Some(&lower)));
        assert!(Location::root().validate(Some(1), None, Some(&lower)));
    }

    #[test]
    fn equality_is_sequence_equality() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(loc("a:b"));
        assert!(set.contains(&Location::new(["a", "b"]).unwrap()));
        assert_ne!(loc("a:b"), loc("b:a"));
    }

    #[test]
    fn serde_uses_joined_string() {
        let l = loc("acme:widgets");
        let json = serde_json::to_string(&l).unwrap();
        assert_eq!(json, "\"acme:widgets\"");
        let back: Location = serde_json::from_str(&json).unwrap();
        assert_eq!(back, l);
        assert!(serde_json::from_str::<Location>("\"a::b\"").is_err());
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9./@_-]{1,12}"
    }

    proptest! {
        #[test]
        fn display_then_parse_is_identity(parts in prop::collection::vec(segment(), 0..6)) {
            let l = Location::new(parts.clone()).unwrap();
            prop_assert_eq!(Location::parse(&l.to_string()).unwrap(), l.clone());
            prop_assert_eq!(l.len(), parts.len());
        }

        #[test]
        fn parent_of_child_is_self(parts in prop::collection::vec(segment(), 0..6), name in segment()) {
            let l = Location::new(parts).unwrap();
            let c = l.child(&name).unwrap();
            prop_assert_eq!(c.len(), l.len() + 1);
            prop_assert_eq!(c.parent(), l);
        }
    }
}

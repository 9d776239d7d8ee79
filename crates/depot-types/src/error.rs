use thiserror::Error;

/// Errors produced while constructing depot value types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    /// A location segment contains the reserved `:` separator.
    #[error("segment {segment:?} contains the reserved separator ':'")]
    SeparatorInSegment { segment: String },

    /// A location segment is the empty string.
    #[error("location {location:?} contains an empty segment")]
    EmptySegment { location: String },
}

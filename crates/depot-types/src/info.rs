use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::location::Location;

/// Arbitrary JSON metadata attached to a node.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Mime type used when the uploader does not know better.
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// Descriptive record of a node in the hierarchy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationInfo {
    /// The node this record describes.
    pub location: Location,
    /// Arbitrary metadata for the node.
    pub metadata: Metadata,
    /// Creation time, if the store tracks it.
    pub date_created: Option<DateTime<Utc>>,
    /// Last update time, if the store tracks it.
    pub date_updated: Option<DateTime<Utc>>,
}

impl LocationInfo {
    /// A record without timestamps, as passed to `create_location`.
    pub fn new(location: Location, metadata: Metadata) -> Self {
        Self {
            location,
            metadata,
            date_created: None,
            date_updated: None,
        }
    }
}

/// Record of a leaf node.
///
/// Objects live at the deepest level of the store and reference a file in the
/// storage backend through `uri`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub location: Location,
    pub metadata: Metadata,
    pub date_created: Option<DateTime<Utc>>,
    pub date_updated: Option<DateTime<Utc>>,
    /// Name of the stored file.
    pub filename: String,
    /// Mime type of the stored file.
    pub mime: String,
    /// Storage URI. Must be understood by the configured storage backend; an
    /// `http(s)` URI may be handed to clients directly.
    pub uri: String,
}

impl ObjectInfo {
    pub fn new(
        location: Location,
        metadata: Metadata,
        filename: impl Into<String>,
        mime: impl Into<String>,
        uri: impl Into<String>,
    ) -> Self {
        Self {
            location,
            metadata,
            date_created: None,
            date_updated: None,
            filename: filename.into(),
            mime: mime.into(),
            uri: uri.into(),
        }
    }

    /// Returns `true` if `uri` is an `http://` or `https://` URL.
    pub fn has_web_uri(&self) -> bool {
        self.uri.starts_with("http://") || self.uri.starts_with("https://")
    }

    /// The location-level part of this record.
    pub fn location_info(&self) -> LocationInfo {
        LocationInfo {
            location: self.location.clone(),
            metadata: self.metadata.clone(),
            date_created: self.date_created,
            date_updated: self.date_updated,
        }
    }
}

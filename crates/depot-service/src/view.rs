//! Outward representations of repository records.
//!
//! Field names are camelCase; timestamps serialize as RFC 3339 strings or
//! `null`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use depot_types::{LocationInfo, Metadata, ObjectInfo};

use crate::context::ServiceSettings;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryInfo {
    pub num_levels: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationView {
    pub location: String,
    pub metadata: Metadata,
    pub date_created: Option<DateTime<Utc>>,
    pub date_updated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<LocationView>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objects: Option<Vec<ObjectView>>,
}

impl LocationView {
    pub fn new(info: &LocationInfo) -> Self {
        Self {
            location: info.location.to_string(),
            metadata: info.metadata.clone(),
            date_created: info.date_created,
            date_updated: info.date_updated,
            children: None,
            objects: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectView {
    pub location: String,
    pub metadata: Metadata,
    pub date_created: Option<DateTime<Utc>>,
    pub date_updated: Option<DateTime<Utc>>,
    pub filename: String,
    pub mime: String,
    /// Where a client fetches the file.
    pub url: String,
}

impl ObjectView {
    pub fn new(info: &ObjectInfo, settings: &ServiceSettings) -> Self {
        Self {
            location: info.location.to_string(),
            metadata: info.metadata.clone(),
            date_created: info.date_created,
            date_updated: info.date_updated,
            filename: info.filename.clone(),
            mime: info.mime.clone(),
            url: object_url(info, settings),
        }
    }
}

/// The object's own URI if it is a public web URL, the read endpoint
/// otherwise.
pub fn object_url(info: &ObjectInfo, settings: &ServiceSettings) -> String {
    match public_url(info, settings) {
        Some(url) => url.to_string(),
        None => format!("{}{}", settings.read_url_prefix, info.location),
    }
}

pub(crate) fn public_url<'a>(info: &'a ObjectInfo, settings: &ServiceSettings) -> Option<&'a str> {
    (settings.web_urls_are_public && info.has_web_uri()).then_some(info.uri.as_str())
}

/// Result of looking up a location.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Listing {
    Location(LocationView),
    Object(ObjectView),
}

/// Whether a put created a node or updated an existing one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PutOutcome {
    Created,
    Updated,
}

impl PutOutcome {
    pub fn from_created(created: bool) -> Self {
        if created {
            Self::Created
        } else {
            Self::Updated
        }
    }
}

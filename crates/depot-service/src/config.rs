use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use depot_access::{SimpleAccessControl, UserSpaceAccessControl};
use depot_storage::bridge::DEFAULT_BRIDGE_CAPACITY;

use crate::error::{ServiceError, ServiceResult};

/// Repository configuration, usually read from a TOML file.
///
/// ```toml
/// web_urls_are_public = true
///
/// [metadata]
/// num_levels = 4
/// snapshot_path = "/var/lib/depot/metadata.json"
///
/// [storage]
/// backend = "filesystem"
/// root = "/var/lib/depot/files"
///
/// [access]
/// policy = "userspace"
/// isolate = false
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Hand out an object's own `http(s)` URI instead of the read endpoint.
    pub web_urls_are_public: bool,
    /// Prefix of the read endpoint; the location string is appended.
    pub read_url_prefix: String,
    pub metadata: MetadataConfig,
    pub storage: StorageConfig,
    pub access: AccessConfig,
    pub log: LogConfig,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            web_urls_are_public: true,
            read_url_prefix: "/read/".into(),
            metadata: MetadataConfig::default(),
            storage: StorageConfig::default(),
            access: AccessConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl RepositoryConfig {
    /// Read and validate a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> ServiceResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServiceError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate a TOML configuration.
    pub fn from_toml_str(text: &str) -> ServiceResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ServiceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ServiceResult<String> {
        toml::to_string_pretty(self).map_err(|e| ServiceError::Config(e.to_string()))
    }

    pub fn validate(&self) -> ServiceResult<()> {
        if self.metadata.num_levels == 0 {
            return Err(ServiceError::Config("metadata.num_levels must be at least 1".into()));
        }
        if let StorageConfig::MemoryBlob {
            buffer_capacity, ..
        } = &self.storage
        {
            if *buffer_capacity == 0 {
                return Err(ServiceError::Config(
                    "storage.buffer_capacity must be positive".into(),
                ));
            }
        }
        self.log.level()?;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Depth of object locations.
    pub num_levels: usize,
    /// Persist committed changes to this JSON file. In-memory only if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            num_levels: 4,
            snapshot_path: None,
        }
    }
}

fn default_base_url() -> String {
    depot_storage::blob::memory::DEFAULT_BASE_URL.to_string()
}

fn default_buffer_capacity() -> usize {
    DEFAULT_BRIDGE_CAPACITY
}

fn default_abort_timeout_ms() -> u64 {
    30_000
}

/// Which storage backend holds object files.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Files below a local directory.
    Filesystem { root: PathBuf },
    /// Blobs in an in-process blob service.
    MemoryBlob {
        #[serde(default = "default_base_url")]
        base_url: String,
        #[serde(default = "default_buffer_capacity")]
        buffer_capacity: usize,
        #[serde(default = "default_abort_timeout_ms")]
        abort_timeout_ms: u64,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            root: PathBuf::from("depot-data"),
        }
    }
}

/// Which access control policy applies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum AccessConfig {
    Userspace(UserSpaceAccessControl),
    Simple(SimpleAccessControl),
    AllowAll,
    DenyAll,
    ReadOnly,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self::Userspace(UserSpaceAccessControl::default())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// One of `trace`, `debug`, `info`, `warn`, `error`.
    pub level: String,
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            ansi: true,
        }
    }
}

impl LogConfig {
    pub fn level(&self) -> ServiceResult<tracing::Level> {
        self.level
            .parse()
            .map_err(|_| ServiceError::Config(format!("unknown log level: {}", self.level)))
    }
}

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use depot_access::{AccessControl, FixedAccessControl};
use depot_meta::{MetadataStore, TreeMetadataStore};
use depot_storage::{FsStorage, InMemoryBlobService, RemoteBlobStorage, RemoteOptions, Storage};

use crate::config::{AccessConfig, RepositoryConfig, StorageConfig};
use crate::error::ServiceResult;

/// Settings that shape what the service hands out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceSettings {
    pub web_urls_are_public: bool,
    pub read_url_prefix: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            web_urls_are_public: true,
            read_url_prefix: "/read/".into(),
        }
    }
}

/// The collaborators of a repository, built once and shared.
#[derive(Clone)]
pub struct RepositoryContext {
    pub metadata: Arc<dyn MetadataStore>,
    pub storage: Arc<dyn Storage>,
    pub access: Arc<dyn AccessControl>,
    pub settings: ServiceSettings,
}

impl RepositoryContext {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        storage: Arc<dyn Storage>,
        access: Arc<dyn AccessControl>,
    ) -> Self {
        Self {
            metadata,
            storage,
            access,
            settings: ServiceSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ServiceSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Build every collaborator described by `config`.
    pub fn from_config(config: &RepositoryConfig) -> ServiceResult<Self> {
        config.validate()?;

        let levels = config.metadata.num_levels;
        let metadata: Arc<dyn MetadataStore> = match &config.metadata.snapshot_path {
            Some(path) => Arc::new(TreeMetadataStore::open(levels, path)?),
            None => Arc::new(TreeMetadataStore::new(levels)?),
        };

        let storage: Arc<dyn Storage> = match &config.storage {
            StorageConfig::Filesystem { root } => Arc::new(FsStorage::open(root)?),
            StorageConfig::MemoryBlob {
                base_url,
                buffer_capacity,
                abort_timeout_ms,
            } => Arc::new(RemoteBlobStorage::with_options(
                Arc::new(InMemoryBlobService::new(base_url.clone())),
                RemoteOptions {
                    buffer_capacity: *buffer_capacity,
                    abort_timeout: Duration::from_millis(*abort_timeout_ms),
                },
            )),
        };

        let access: Arc<dyn AccessControl> = match &config.access {
            AccessConfig::Userspace(policy) => Arc::new(*policy),
            AccessConfig::Simple(policy) => Arc::new(*policy),
            AccessConfig::AllowAll => Arc::new(FixedAccessControl::allow_all()),
            AccessConfig::DenyAll => Arc::new(FixedAccessControl::deny_all()),
            AccessConfig::ReadOnly => Arc::new(FixedAccessControl::read_only()),
        };

        info!(
            num_levels = levels,
            storage = ?config.storage,
            access = ?config.access,
            "repository context ready"
        );
        Ok(Self::new(metadata, storage, access).with_settings(ServiceSettings {
            web_urls_are_public: config.web_urls_are_public,
            read_url_prefix: config.read_url_prefix.clone(),
        }))
    }

    pub fn num_levels(&self) -> usize {
        self.metadata.num_levels()
    }
}

impl std::fmt::Debug for RepositoryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryContext")
            .field("num_levels", &self.num_levels())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

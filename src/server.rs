//! Gateway assembly: wires a metadata repository, an optional content
//! store and the configuration into a ready-to-serve TCP listener.

use std::io;
use std::sync::Arc;

use rand::Rng;

use crate::cache::{BlockService, ContentStore, SliceCache, TransferManager};
use crate::config::CoreConfig;
use crate::meta::MetadataRepository;
use crate::shutdown::ShutdownController;
use crate::tcp::GatewayListener;
use crate::xdr::nfs3;

/// Derives the process-wide write verifier: the configured seed for
/// deterministic tests, OS randomness otherwise. Generated exactly once
/// per process lifetime; clients detect restarts by comparing it across
/// UNSTABLE WRITE / COMMIT pairs.
pub fn write_verifier(config: &CoreConfig) -> nfs3::writeverf3 {
    let value = config.write_verifier_seed.unwrap_or_else(|| rand::thread_rng().gen());
    value.to_be_bytes()
}

/// Builder assembling the data path around a metadata repository.
pub struct Gateway {
    repo: Arc<dyn MetadataRepository>,
    store: Option<Arc<dyn ContentStore>>,
    config: CoreConfig,
    export_name: Option<String>,
}

impl Gateway {
    pub fn new(repo: Arc<dyn MetadataRepository>) -> Self {
        Gateway { repo, store: None, config: CoreConfig::default(), export_name: None }
    }

    /// Attaches a content store; without one the gateway runs cache-only
    /// and flushes merely coalesce.
    pub fn with_store(mut self, store: Arc<dyn ContentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_config(mut self, config: CoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_export_name(mut self, name: impl Into<String>) -> Self {
        self.export_name = Some(name.into());
        self
    }

    /// Validates the configuration, builds the cache, uploader and block
    /// service, and binds the TCP listener.
    pub async fn bind(self, ipstr: &str) -> io::Result<GatewayListener> {
        self.config.validate().map_err(io::Error::other)?;
        let config = Arc::new(self.config);
        let shutdown = ShutdownController::new();

        let cache = Arc::new(SliceCache::new(config.chunk_size));
        let transfer = self.store.map(|store| {
            TransferManager::new(
                store,
                cache.clone(),
                config.upload_workers,
                config.upload_queue_depth,
                shutdown.token(),
            )
        });
        let blocks = Arc::new(BlockService::new(
            self.repo.clone(),
            cache,
            transfer,
            config.sparse_read_fill,
        ));

        let verifier = write_verifier(&config);
        let mut listener =
            GatewayListener::bind(ipstr, self.repo, blocks, verifier, config, shutdown).await?;
        if let Some(name) = self.export_name {
            listener.with_export_name(name);
        }
        Ok(listener)
    }
}

//! Wires config into a store, a shared cache, repositories and the sync engine.

use xuanji_core::{
    CacheLayer, Entity, RemoteClient, Repository, Store, StoreError, SyncEngine, SyncError,
    SyncTables,
};

use crate::config::Config;

pub struct App {
    pub config: Config,
    pub store: Store,
    pub cache: CacheLayer,
}

impl App {
    pub async fn open(config: Config) -> Result<Self, StoreError> {
        let store = Store::open(&config.database_path.value).await?;
        let cache = CacheLayer::new(&config.cache());
        tracing::debug!(
            path = %config.database_path.value.display(),
            cache_max_entries = config.cache_max_entries.value,
            "application store ready"
        );
        Ok(Self {
            config,
            store,
            cache,
        })
    }

    /// Repositories share the application cache.
    pub fn repo<T: Entity>(&self) -> Repository<T> {
        Repository::new(self.store.clone(), self.cache.clone())
    }

    pub fn sync_engine(&self) -> Result<SyncEngine, SyncError> {
        let sync = &self.config.sync;
        let url = sync
            .server_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or(SyncError::NotConfigured)?;
        let client = RemoteClient::new(url, sync.api_key.clone(), &sync.settings)?;
        Ok(SyncEngine::new(
            self.store.clone(),
            self.cache.clone(),
            client,
            SyncTables::standard(),
            sync.settings.clone(),
        ))
    }

    /// Runs an incremental sync if `auto_sync` is enabled. Failures are
    /// logged and never fail the command.
    pub async fn try_auto_sync(&self) {
        if !self.config.sync.auto_sync || !self.config.sync.is_configured() {
            return;
        }
        let engine = match self.sync_engine() {
            Ok(engine) => engine,
            Err(e) => {
                tracing::warn!(error = %e, "auto-sync unavailable");
                return;
            }
        };
        match engine.incremental_sync().await {
            Ok(result) if result.success => tracing::debug!(%result, "auto-sync complete"),
            Ok(result) => tracing::warn!(%result, "auto-sync had errors"),
            Err(e) => tracing::warn!(error = %e, "auto-sync skipped"),
        }
    }
}

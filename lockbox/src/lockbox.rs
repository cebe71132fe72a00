//! Lockbox - the credential-store facade.
//!
//! A [`Lockbox`] turns `(key, namespace)` into the vault's service
//! identifier and `(payload, accessibility, access group, sync flag)` into
//! the vault's attribute set, then runs the vault call on the serial
//! [`KeychainQueue`]. Reads collapse every failure into "no value"; writes
//! collapse every failure into `false`. The `try_*` variants keep the
//! detail.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::config::LockboxConfig;
use crate::error::Result;
use crate::models::{Accessibility, Attributes, Query};
use crate::queue::KeychainQueue;
use crate::vault::{Vault, VaultStatus};

/// Last known value per service identifier. `None` records a miss.
type ValueCache = Arc<Mutex<HashMap<String, Option<Vec<u8>>>>>;

/// Thread-safe get/set/delete facade over one vault.
///
/// Configuration is fixed at construction. Every vault call goes through
/// the queue, so a `Lockbox` can be shared freely across threads.
pub struct Lockbox {
    config: LockboxConfig,
    vault: Arc<dyn Vault>,
    queue: Arc<KeychainQueue>,
    cache: Option<ValueCache>,
}

impl Lockbox {
    /// Build a lockbox over `vault`, running calls on `queue`.
    pub fn new(
        config: LockboxConfig,
        vault: Arc<dyn Vault>,
        queue: Arc<KeychainQueue>,
    ) -> Result<Self> {
        config.validate()?;

        let cache = config
            .cache_values
            .then(|| Arc::new(Mutex::new(HashMap::new())));

        debug!(
            "Lockbox ready (namespace: {:?}, accessibility: {}, queue: {})",
            config.namespace,
            config.accessibility,
            queue.name()
        );

        Ok(Self {
            config,
            vault,
            queue,
            cache,
        })
    }

    /// Build a lockbox over `vault` on the process-wide queue.
    pub fn with_shared_queue(config: LockboxConfig, vault: Arc<dyn Vault>) -> Result<Self> {
        Self::new(config, vault, KeychainQueue::shared()?)
    }

    /// Build a lockbox over the OS credential store on the process-wide queue.
    #[cfg(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "windows",
        target_os = "linux"
    ))]
    pub fn native(config: LockboxConfig) -> Result<Self> {
        Self::with_shared_queue(config, Arc::new(crate::vault::KeyringVault::new()))
    }

    pub fn config(&self) -> &LockboxConfig {
        &self.config
    }

    pub fn namespace(&self) -> Option<&str> {
        self.config.namespace.as_deref()
    }

    pub fn accessibility(&self) -> Accessibility {
        self.config.accessibility
    }

    pub fn access_group(&self) -> Option<&str> {
        self.config.access_group.as_deref()
    }

    pub fn synchronizable(&self) -> Option<bool> {
        self.config.synchronizable
    }

    /// The queue vault calls run on. Use it to `barrier()` before shutdown.
    pub fn queue(&self) -> &Arc<KeychainQueue> {
        &self.queue
    }

    // =========================================================================
    // Query construction
    // =========================================================================

    /// The vault service identifier for `key`.
    pub fn service_for(&self, key: &str) -> String {
        match &self.config.namespace {
            Some(namespace) => format!("{}.{}", namespace, key),
            None => key.to_string(),
        }
    }

    fn scope_for(&self, key: &str) -> Query {
        Query::new(self.service_for(key))
            .with_access_group(self.config.access_group.clone())
            .with_synchronizable(self.config.synchronizable)
    }

    /// The lookup query for `key`.
    pub fn lookup_query(&self, key: &str) -> Query {
        self.scope_for(key).returning_data()
    }

    /// The attribute set written for `key`.
    pub fn write_attributes(&self, key: &str, payload: &[u8]) -> Attributes {
        Attributes::new(
            self.scope_for(key),
            payload.to_vec(),
            self.config.accessibility,
        )
    }

    // =========================================================================
    // Vault sequences (run on the queue)
    // =========================================================================

    fn read(
        vault: &dyn Vault,
        query: &Query,
        cache: Option<&ValueCache>,
    ) -> Result<Option<Vec<u8>>> {
        if let Some(hit) = cache.and_then(|c| lock(c).get(&query.service).cloned()) {
            debug!("Cache hit for {}", query.service);
            return Ok(hit);
        }

        let value = match vault.copy_matching(query) {
            Ok(data) => {
                debug!("Found {} bytes for {}", data.len(), query.service);
                Some(data)
            }
            Err(VaultStatus::ItemNotFound) => {
                debug!("Nothing stored for {}", query.service);
                None
            }
            Err(status) => return Err(status.into()),
        };

        if let Some(cache) = cache {
            lock(cache).insert(query.service.clone(), value.clone());
        }
        Ok(value)
    }

    fn write(
        vault: &dyn Vault,
        scope: &Query,
        attributes: Option<&Attributes>,
        cache: Option<&ValueCache>,
    ) -> Result<()> {
        match attributes {
            Some(attributes) => match vault.add(attributes) {
                Ok(()) => debug!("Inserted {} bytes for {}", attributes.data.len(), scope.service),
                Err(VaultStatus::DuplicateItem) => {
                    debug!("{} exists, updating", scope.service);
                    vault.update(scope, attributes)?;
                }
                Err(status) => return Err(status.into()),
            },
            None => match vault.delete(scope) {
                Ok(()) => debug!("Deleted {}", scope.service),
                Err(VaultStatus::ItemNotFound) => debug!("Nothing to delete for {}", scope.service),
                Err(status) => return Err(status.into()),
            },
        }

        if let Some(cache) = cache {
            lock(cache).insert(
                scope.service.clone(),
                attributes.map(|a| a.data.clone()),
            );
        }
        Ok(())
    }

    fn read_job(&self, key: &str) -> impl FnOnce() -> Result<Option<Vec<u8>>> + Send + 'static {
        let vault = self.vault.clone();
        let cache = self.cache.clone();
        let query = self.lookup_query(key);
        move || Self::read(vault.as_ref(), &query, cache.as_ref())
    }

    fn write_job(
        &self,
        key: &str,
        payload: Option<&[u8]>,
    ) -> impl FnOnce() -> Result<()> + Send + 'static {
        let vault = self.vault.clone();
        let cache = self.cache.clone();
        let scope = self.scope_for(key);
        let attributes = payload.map(|p| self.write_attributes(key, p));
        move || Self::write(vault.as_ref(), &scope, attributes.as_ref(), cache.as_ref())
    }

    // =========================================================================
    // Public operations
    // =========================================================================

    /// The payload stored under `key`, with vault errors surfaced.
    ///
    /// `Ok(None)` means nothing is stored; `Ok(Some(vec![]))` means an empty
    /// payload is stored.
    pub fn try_get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.queue.run(self.read_job(key))?
    }

    /// The payload stored under `key`. Not found and vault errors both read
    /// as `None`.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.try_get(key).unwrap_or_else(|e| {
            debug!("Lookup for {} failed: {}", self.service_for(key), e);
            None
        })
    }

    /// Store `payload` under `key`, or delete the record when `payload` is
    /// `None`. Deleting a missing record succeeds.
    pub fn try_set(&self, key: &str, payload: Option<&[u8]>) -> Result<()> {
        self.queue.run(self.write_job(key, payload))?
    }

    /// Store or delete, reporting only whether it worked.
    pub fn set(&self, key: &str, payload: Option<&[u8]>) -> bool {
        self.try_set(key, payload)
            .map_err(|e| warn!("Write for {} failed: {}", self.service_for(key), e))
            .is_ok()
    }

    /// Delete the record under `key`.
    pub fn remove(&self, key: &str) -> bool {
        self.set(key, None)
    }

    pub async fn try_get_async(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.queue.run_async(self.read_job(key)).await?
    }

    pub async fn get_async(&self, key: &str) -> Option<Vec<u8>> {
        self.try_get_async(key).await.unwrap_or_else(|e| {
            debug!("Lookup for {} failed: {}", self.service_for(key), e);
            None
        })
    }

    pub async fn try_set_async(&self, key: &str, payload: Option<&[u8]>) -> Result<()> {
        self.queue.run_async(self.write_job(key, payload)).await?
    }

    pub async fn set_async(&self, key: &str, payload: Option<&[u8]>) -> bool {
        self.try_set_async(key, payload)
            .await
            .map_err(|e| warn!("Write for {} failed: {}", self.service_for(key), e))
            .is_ok()
    }

    /// Forget every cached value. No-op when caching is off.
    pub fn clear_cache(&self) {
        let Some(cache) = self.cache.clone() else {
            return;
        };
        if let Err(e) = self.queue.run(move || lock(&cache).clear()) {
            warn!("Failed to clear lockbox cache: {}", e);
        }
    }
}

impl std::fmt::Debug for Lockbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lockbox")
            .field("config", &self.config)
            .field("queue", &self.queue)
            .finish()
    }
}

fn lock(cache: &ValueCache) -> std::sync::MutexGuard<'_, HashMap<String, Option<Vec<u8>>>> {
    cache.lock().unwrap_or_else(|e| e.into_inner())
}

//! Lazily-initialised backend client per region.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::info;
use twinchat_common::config::BackendsConfig;
use twinchat_common::{AppError, AppResult, Region};

use crate::cloudbase::CloudbaseStore;
use crate::document::DocumentStore;
use crate::memory::MemoryStore;
use crate::postgres::PostgresStore;

/// Owns at most one backend client per region for the life of the process.
///
/// Concurrent first requests for the same region share one initialisation.
pub struct BackendRegistry {
    config: BackendsConfig,
    cn: OnceCell<Arc<dyn DocumentStore>>,
    global: OnceCell<Arc<dyn DocumentStore>>,
}

impl BackendRegistry {
    /// Create a registry. Nothing connects until a client is requested.
    #[must_use]
    pub fn new(config: BackendsConfig) -> Self {
        Self {
            config,
            cn: OnceCell::new(),
            global: OnceCell::new(),
        }
    }

    const fn cell(&self, region: Region) -> &OnceCell<Arc<dyn DocumentStore>> {
        match region {
            Region::Cn => &self.cn,
            Region::Global => &self.global,
        }
    }

    /// Whether a region has credentials (or runs in memory).
    #[must_use]
    pub const fn is_configured(&self, region: Region) -> bool {
        if self.config.in_memory {
            return true;
        }
        match region {
            Region::Cn => self.config.cn.is_some(),
            Region::Global => self.config.global.is_some(),
        }
    }

    /// Get the client for a region, connecting on first use.
    ///
    /// Fails with [`AppError::Config`] when the region has no credentials.
    pub async fn client(&self, region: Region) -> AppResult<Arc<dyn DocumentStore>> {
        self.cell(region)
            .get_or_try_init(|| self.connect(region))
            .await
            .cloned()
    }

    /// Install a client for a region if none has been initialised yet.
    /// Returns `false` when the region already had a client.
    pub fn install(&self, region: Region, store: Arc<dyn DocumentStore>) -> bool {
        self.cell(region).set(store).is_ok()
    }

    /// Drop every initialised client. Test harnesses only.
    pub fn reset(&mut self) {
        self.cn = OnceCell::new();
        self.global = OnceCell::new();
    }

    async fn connect(&self, region: Region) -> AppResult<Arc<dyn DocumentStore>> {
        if self.config.in_memory {
            info!(region = %region, "Using in-memory backend");
            return Ok(Arc::new(MemoryStore::new(region)));
        }

        match region {
            Region::Global => {
                let config = self.config.global.as_ref().ok_or_else(|| {
                    AppError::Config("global backend credentials are not configured".to_string())
                })?;
                let store = PostgresStore::connect(config).await?;
                info!(region = %region, "Connected to global backend");
                Ok(Arc::new(store))
            }
            Region::Cn => {
                let config = self.config.cn.as_ref().ok_or_else(|| {
                    AppError::Config("cn backend credentials are not configured".to_string())
                })?;
                let store = CloudbaseStore::new(config)?;
                info!(region = %region, "Initialized cn backend client");
                Ok(Arc::new(store))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_credentials_fail_fast() {
        let registry = BackendRegistry::new(BackendsConfig::default());
        assert!(!registry.is_configured(Region::Cn));

        let err = registry.client(Region::Cn).await.err().unwrap();
        assert!(matches!(err, AppError::Config(_)));
        let err = registry.client(Region::Global).await.err().unwrap();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[tokio::test]
    async fn test_client_is_memoized() {
        let registry = BackendRegistry::new(BackendsConfig {
            in_memory: true,
            ..BackendsConfig::default()
        });

        let a = registry.client(Region::Global).await.unwrap();
        let b = registry.client(Region::Global).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.region(), Region::Global);

        let cn = registry.client(Region::Cn).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &cn));
    }

    #[tokio::test]
    async fn test_concurrent_first_use_initialises_once() {
        let registry = Arc::new(BackendRegistry::new(BackendsConfig {
            in_memory: true,
            ..BackendsConfig::default()
        }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.client(Region::Cn).await.unwrap() })
            })
            .collect();

        let mut clients = Vec::new();
        for handle in handles {
            clients.push(handle.await.unwrap());
        }
        assert!(clients.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn test_install_and_reset() {
        let mut registry = BackendRegistry::new(BackendsConfig::default());
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new(Region::Cn));

        assert!(registry.install(Region::Cn, Arc::clone(&store)));
        assert!(!registry.install(Region::Cn, Arc::new(MemoryStore::new(Region::Cn))));
        assert!(Arc::ptr_eq(&registry.client(Region::Cn).await.unwrap(), &store));

        registry.reset();
        assert!(registry.client(Region::Cn).await.is_err());
    }
}

//! Per-region service bundles.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{info, warn};
use twinchat_common::{AppResult, Config, Region};
use twinchat_store::{BackendRegistry, DocumentStore};

use super::chat::{ChatService, StoreChatService};
use super::device::DeviceRegistry;
use super::geolocation::GeoLocator;
use super::permission::{ChatPermissionEngine, SocialGraph};
use super::region::RegionResolver;
use super::session::{HttpSessionRevoker, SessionRevoker};
use super::user::{StoreUserService, UserService};
use super::verification::VerificationService;

/// Every service for one region, bound to that region's backend.
pub struct Services {
    pub region: Region,
    pub users: Arc<dyn UserService>,
    pub chat: Arc<dyn ChatService>,
    pub verification: VerificationService,
    pub devices: DeviceRegistry,
}

/// Builds each region's [`Services`] once and hands out the same bundle
/// for the rest of the process.
pub struct ServiceRegistry {
    config: Config,
    backends: BackendRegistry,
    geo: Arc<GeoLocator>,
    cn: OnceCell<Arc<Services>>,
    global: OnceCell<Arc<Services>>,
}

impl ServiceRegistry {
    /// Create a registry from configuration. Nothing connects yet.
    pub fn new(config: Config) -> AppResult<Self> {
        let geo = Arc::new(GeoLocator::from_config(&config.geolocation)?);
        Ok(Self::with_geolocator(config, geo))
    }

    /// Create a registry with a prepared geolocator.
    #[must_use]
    pub fn with_geolocator(config: Config, geo: Arc<GeoLocator>) -> Self {
        Self {
            backends: BackendRegistry::new(config.backends.clone()),
            config,
            geo,
            cn: OnceCell::new(),
            global: OnceCell::new(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub const fn backends(&self) -> &BackendRegistry {
        &self.backends
    }

    /// Region resolver sharing this registry's geolocator.
    #[must_use]
    pub fn region_resolver(&self) -> RegionResolver {
        RegionResolver::new(self.config.deployment.clone(), Arc::clone(&self.geo))
    }

    /// Install a backend for a region before first use.
    pub fn install_backend(&self, region: Region, store: Arc<dyn DocumentStore>) -> bool {
        self.backends.install(region, store)
    }

    /// Services for a region, built on first use.
    pub async fn services(&self, region: Region) -> AppResult<Arc<Services>> {
        let cell = match region {
            Region::Cn => &self.cn,
            Region::Global => &self.global,
        };
        cell.get_or_try_init(|| async { self.build(region).await.map(Arc::new) })
            .await
            .cloned()
    }

    /// Drop every cached bundle and backend client. Test harnesses only.
    pub fn reset(&mut self) {
        self.cn = OnceCell::new();
        self.global = OnceCell::new();
        self.backends.reset();
    }

    async fn build(&self, region: Region) -> AppResult<Services> {
        let store = self.backends.client(region).await?;

        let peer = region.other();
        let mirror = if self.backends.is_configured(peer) {
            match self.backends.client(peer).await {
                Ok(peer_store) => Some(peer_store),
                Err(e) => {
                    warn!(region = %peer, error = %e, "Peer region unavailable; status will not be mirrored");
                    None
                }
            }
        } else {
            None
        };

        let users = Arc::new(StoreUserService::new(Arc::clone(&store), mirror));
        let graph: Arc<dyn SocialGraph> = users.clone();
        let chat = StoreChatService::new(Arc::clone(&store), ChatPermissionEngine::new(graph));

        let revoker = HttpSessionRevoker::for_region(region, &self.config.backends)?
            .map(|r| Arc::new(r) as Arc<dyn SessionRevoker>);
        let devices = DeviceRegistry::new(
            Arc::clone(&store),
            revoker,
            Arc::clone(&self.geo),
            self.config.sessions.clone(),
        );
        let verification = VerificationService::new(store, self.config.verification.clone());

        info!(region = %region, "Services initialized");
        Ok(Services {
            region,
            users,
            chat: Arc::new(chat),
            verification,
            devices,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::user::testing::seed_user;
    use twinchat_common::AppError;
    use twinchat_common::config::BackendsConfig;
    use twinchat_store::MemoryStore;

    fn registry() -> ServiceRegistry {
        ServiceRegistry::with_geolocator(Config::for_testing(), Arc::new(GeoLocator::disabled()))
    }

    #[tokio::test]
    async fn test_services_are_memoized_per_region() {
        let registry = registry();
        let a = registry.services(Region::Global).await.unwrap();
        let b = registry.services(Region::Global).await.unwrap();
        let cn = registry.services(Region::Cn).await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &cn));
        assert_eq!(a.users.region(), Region::Global);
        assert_eq!(cn.users.region(), Region::Cn);
    }

    #[tokio::test]
    async fn test_regions_are_isolated() {
        let registry = registry();
        let global = registry.services(Region::Global).await.unwrap();
        let cn = registry.services(Region::Cn).await.unwrap();

        let alice = seed_user(global.users.as_ref(), "alice").await;
        assert!(cn.users.get_user(&alice.id).await.is_err());
        assert!(cn.users.find_user_by_email("alice@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_installed_backend_is_used() {
        let registry = registry();
        let store = Arc::new(MemoryStore::new(Region::Cn));
        assert!(registry.install_backend(Region::Cn, store.clone()));

        let cn = registry.services(Region::Cn).await.unwrap();
        seed_user(cn.users.as_ref(), "bob").await;
        assert_eq!(store.count("users").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_region_fails() {
        let mut config = Config::for_testing();
        config.backends = BackendsConfig::default();
        let registry = ServiceRegistry::with_geolocator(config, Arc::new(GeoLocator::disabled()));

        let err = registry.services(Region::Cn).await.err().unwrap();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[tokio::test]
    async fn test_reset_rebuilds() {
        let mut registry = registry();
        let before = registry.services(Region::Global).await.unwrap();
        registry.reset();
        let after = registry.services(Region::Global).await.unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
    }
}

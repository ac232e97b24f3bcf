//! Long-lived services shared by every request handler

use crate::config::AppConfig;
use pecoin_core::{ActivityProvider, BalanceProvider, ImageOrigin, Result, UrlSigner};
use pecoin_engine::settings::{millis, CacheSettings};
use pecoin_engine::{
    BalanceCache, CacheRegistry, EcosystemCache, ImageCache, NameResolver, PerformanceMonitor,
    SignedUrlCache,
};
use pecoin_networking::{HttpImageOrigin, SolanaRpcClient, SupabaseStorage};
use pecoin_persistence::Database;
use std::sync::Arc;
use tracing::info;

/// External collaborators the caches sit in front of
pub struct Collaborators {
    pub balances: Arc<dyn BalanceProvider>,
    pub activity: Arc<dyn ActivityProvider>,
    pub signer: Arc<dyn UrlSigner>,
    pub images: Arc<dyn ImageOrigin>,
}

#[derive(Clone)]
pub struct AppState {
    pub balances: Arc<BalanceCache>,
    pub signed_urls: Arc<SignedUrlCache>,
    pub images: Arc<ImageCache>,
    pub names: Arc<NameResolver>,
    pub ecosystem: Arc<EcosystemCache>,
    pub registry: Arc<CacheRegistry>,
    pub monitor: Arc<PerformanceMonitor>,
    pub database: Arc<Database>,
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    /// Open the database and construct the production clients
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let database = Arc::new(Database::connect(&config.database.path).await?);
        info!("Entity store opened at {}", config.database.path.display());

        let rpc = Arc::new(SolanaRpcClient::new(&config.rpc.url)?);
        let storage = SupabaseStorage::new(
            &config.storage.supabase_url,
            &config.storage.service_key,
            &config.storage.bucket,
        )?;

        let collaborators = Collaborators {
            balances: rpc.clone(),
            activity: rpc,
            signer: Arc::new(storage),
            images: Arc::new(HttpImageOrigin::new(config.caches.images.max_download_bytes)?),
        };

        Ok(Self::assemble(
            collaborators,
            database,
            &config.caches,
            config.admin.token.clone(),
        ))
    }

    /// Wire the caches around `collaborators`; one instance per process
    pub fn assemble(
        collaborators: Collaborators,
        database: Arc<Database>,
        settings: &CacheSettings,
        admin_token: Option<String>,
    ) -> Self {
        let monitor = Arc::new(PerformanceMonitor::new(
            settings.monitor.history_capacity,
            millis(settings.monitor.slow_threshold_ms),
        ));

        let balances = Arc::new(
            BalanceCache::new(collaborators.balances, &settings.balances)
                .with_monitor(monitor.clone()),
        );
        let signed_urls = Arc::new(
            SignedUrlCache::new(collaborators.signer, &settings.signed_urls)
                .with_monitor(monitor.clone()),
        );
        let images = Arc::new(
            ImageCache::new(collaborators.images, &settings.images).with_monitor(monitor.clone()),
        );
        let names = Arc::new(NameResolver::new(database.clone(), &settings.names));
        let ecosystem = Arc::new(
            EcosystemCache::new(
                database.clone(),
                balances.clone(),
                collaborators.activity,
                &settings.ecosystem,
            )
            .with_monitor(monitor.clone()),
        );

        let mut registry = CacheRegistry::new();
        registry.register_all(balances.caches());
        registry.register(signed_urls.cache());
        registry.register(images.cache());
        registry.register(names.cache());
        info!("Registered caches: {}", registry.names().join(", "));

        Self {
            balances,
            signed_urls,
            images,
            names,
            ecosystem,
            registry: Arc::new(registry),
            monitor,
            database,
            admin_token: admin_token.map(Arc::from),
        }
    }
}

//! PEcoin Engine - Caches in front of the chain, storage and entity store

pub mod admin;
pub mod balances;
pub mod ecosystem;
pub mod images;
pub mod monitor;
pub mod names;
pub mod settings;
pub mod signed_urls;

mod fetch;

#[cfg(test)]
mod testing;

pub use admin::{spawn_maintenance, CacheRegistry, MaintenanceHandle};
pub use balances::BalanceCache;
pub use ecosystem::{EcosystemCache, EcosystemSnapshot, EcosystemState, EcosystemStats};
pub use images::{ImageCache, ImageSource, ServedImage};
pub use monitor::{Backend, PerformanceMonitor, PerformanceStats, RoutingAdvice};
pub use names::{format_address, NameResolver, ResolvedName};
pub use settings::CacheSettings;
pub use signed_urls::SignedUrlCache;

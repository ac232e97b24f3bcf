//! PEcoin Server - HTTP API over the PEcoin caches

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::AppConfig;
pub use routes::build_router;
pub use state::AppState;

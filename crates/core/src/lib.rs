//! PEcoin Core - Shared data models, types, errors, and collaborator traits

pub mod errors;
pub mod models;
pub mod ports;
pub mod types;

pub use errors::{Error, Result};
pub use models::*;
pub use ports::*;
pub use types::*;

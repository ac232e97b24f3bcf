//! Data models for PEcoin entities and cache payloads

mod asset;
mod balance;
mod image;
mod participant;

pub use asset::*;
pub use balance::*;
pub use image::*;
pub use participant::*;

//! SQLite entity store

mod connection;
mod entities;

pub use connection::Database;
pub use entities::*;

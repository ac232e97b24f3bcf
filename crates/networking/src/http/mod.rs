//! HTTP plumbing shared by the collaborator clients

mod client;

pub use client::*;

//! PEcoin Networking - HTTP clients for the chain, storage, and image hosts

pub mod http;
pub mod images;
pub mod rpc;
pub mod storage;

pub use images::HttpImageOrigin;
pub use rpc::SolanaRpcClient;
pub use storage::SupabaseStorage;

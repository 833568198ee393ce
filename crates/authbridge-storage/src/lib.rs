//! Token record storage for AuthBridge.
//!
//! Tokens issued by the downstream provider are stored per external user
//! id and read back by the token-exchange endpoint. Two backends are
//! provided: an in-process map for single-instance deployments and Redis
//! for anything that scales past one instance. Expiry is evaluated when a
//! record is read, so neither backend needs a sweeper task.

pub mod error;
pub mod record;
pub mod store;

pub use error::StorageError;
pub use record::TokenRecord;
pub use store::TokenStore;

//! At-rest protection for small text secrets such as scanner tokens. One 256-bit
//! key per installation, provisioned lazily and kept in the settings store.

pub mod error;
pub mod store;

pub use error::SecretError;
pub use store::SecretStore;

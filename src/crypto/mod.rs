//! Symmetric encryption for backups and sync payloads

mod vault;

pub use vault::{CryptoVault, MAGIC};

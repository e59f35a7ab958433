//! Configuration Management Module
//!
//! Persistent client settings and keychain-backed password storage.

pub mod keychain;
pub mod storage;
pub mod types;

pub use keychain::{Keychain, KeychainError};
pub use storage::{config_dir, config_file, ConfigStorage, StorageError};
pub use types::ClientConfig;

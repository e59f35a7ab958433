//! Keychain Integration
//!
//! Keeps the bastion password in the system keychain via the `keyring` crate.

use keyring::Entry;

/// Service name for keychain entries
const SERVICE_NAME: &str = "jumpterm";

#[derive(Debug, thiserror::Error)]
pub enum KeychainError {
    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Password store keyed by account (`<username>@<host>`)
pub struct Keychain {
    service: String,
}

impl Keychain {
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
        }
    }

    /// Create with custom service name (for testing)
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Store a password, replacing any existing one
    pub fn store(&self, account: &str, secret: &str) -> Result<(), KeychainError> {
        tracing::debug!("Keychain store: service={}, account={}", self.service, account);
        let entry = Entry::new(&self.service, account)?;
        entry.set_password(secret)?;
        Ok(())
    }

    /// Retrieve a password; `Ok(None)` when no entry exists
    pub fn get(&self, account: &str) -> Result<Option<String>, KeychainError> {
        let entry = Entry::new(&self.service, account)?;
        match entry.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => {
                tracing::debug!("Keychain get: no entry for account={}", account);
                Ok(None)
            }
            Err(e) => Err(KeychainError::Keyring(e)),
        }
    }

    /// Delete a password
    pub fn delete(&self, account: &str) -> Result<(), KeychainError> {
        let entry = Entry::new(&self.service, account)?;
        match entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()), // Already deleted
            Err(e) => Err(KeychainError::Keyring(e)),
        }
    }
}

impl Default for Keychain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Note: this test talks to the real system keychain
    #[test]
    #[ignore] // Run manually: cargo test keychain -- --ignored
    fn test_keychain_operations() {
        let keychain = Keychain::with_service("jumpterm.test");
        let account = format!("tester-{}@jump.example.com", uuid::Uuid::new_v4());

        assert_eq!(keychain.get(&account).unwrap(), None);

        keychain.store(&account, "first").unwrap();
        assert_eq!(keychain.get(&account).unwrap().as_deref(), Some("first"));

        keychain.store(&account, "second").unwrap();
        assert_eq!(keychain.get(&account).unwrap().as_deref(), Some("second"));

        keychain.delete(&account).unwrap();
        keychain.delete(&account).unwrap();
        assert_eq!(keychain.get(&account).unwrap(), None);
    }
}

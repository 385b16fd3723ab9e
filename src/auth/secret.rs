//! Storage for the refresh token.
//!
//! The token lives in the OS credential store, never in the session file.

use keyring::Entry;
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::SessionError;

/// Keyring service name.
const SERVICE: &str = "graph-snippets";
/// Keyring account holding the refresh token.
const ACCOUNT_REFRESH_TOKEN: &str = "refresh_token";

/// A single secret slot.
pub trait SecretStore: Send + Sync {
    /// Returns `Ok(None)` when nothing is stored.
    fn get(&self) -> Result<Option<Zeroizing<String>>, SessionError>;

    fn set(&self, secret: &str) -> Result<(), SessionError>;

    /// Removing an absent secret is not an error.
    fn delete(&self) -> Result<(), SessionError>;
}

/// Secret kept in the platform keyring (Keychain, Credential Manager, kernel keyring).
#[derive(Debug, Clone)]
pub struct KeyringSecret {
    service: String,
    account: String,
}

impl KeyringSecret {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    /// The slot used for this application's refresh token.
    pub fn refresh_token() -> Self {
        Self::new(SERVICE, ACCOUNT_REFRESH_TOKEN)
    }

    fn entry(&self) -> Result<Entry, SessionError> {
        Ok(Entry::new(&self.service, &self.account)?)
    }
}

impl SecretStore for KeyringSecret {
    fn get(&self) -> Result<Option<Zeroizing<String>>, SessionError> {
        match self.entry()?.get_password() {
            Ok(secret) => Ok(Some(Zeroizing::new(secret))),
            Err(keyring::Error::NoEntry) => {
                debug!("No {} entry in keyring", self.account);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, secret: &str) -> Result<(), SessionError> {
        self.entry()?.set_password(secret)?;
        Ok(())
    }

    fn delete(&self) -> Result<(), SessionError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process secret for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MemorySecret(std::sync::Mutex<Option<String>>);

#[cfg(test)]
impl SecretStore for MemorySecret {
    fn get(&self) -> Result<Option<Zeroizing<String>>, SessionError> {
        Ok(self.0.lock().unwrap().clone().map(Zeroizing::new))
    }

    fn set(&self, secret: &str) -> Result<(), SessionError> {
        *self.0.lock().unwrap() = Some(secret.to_string());
        Ok(())
    }

    fn delete(&self) -> Result<(), SessionError> {
        *self.0.lock().unwrap() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_token_slot() {
        let slot = KeyringSecret::refresh_token();
        assert_eq!(slot.service, "graph-snippets");
        assert_eq!(slot.account, "refresh_token");
    }

    #[test]
    fn test_memory_secret() {
        let secret = MemorySecret::default();
        assert!(secret.get().unwrap().is_none());
        secret.set("rt").unwrap();
        assert_eq!(secret.get().unwrap().as_deref().map(String::as_str), Some("rt"));
        secret.delete().unwrap();
        secret.delete().unwrap();
        assert!(secret.get().unwrap().is_none());
    }
}

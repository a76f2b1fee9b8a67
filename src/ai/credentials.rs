//! Credential storage for backend API keys.
//!
//! Keys live in the platform keychain / credential manager, with an
//! environment-variable fallback so headless deployments and `.env`
//! development setups work without a keychain.

use keyring::Entry;
use thiserror::Error;
use tracing::debug;

const SERVICE_NAME: &str = "com.custodian.organizer";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("api key not found for provider {0}")]
    NotFound(String),
    #[error("failed to store api key: {0}")]
    Store(#[source] keyring::Error),
    #[error("failed to delete api key: {0}")]
    Delete(#[source] keyring::Error),
}

pub trait CredentialStore: Send + Sync {
    fn api_key(&self, provider: &str) -> Result<String, CredentialError>;
}

/// Keychain-backed credential store with environment fallback
/// (`ANTHROPIC_API_KEY`, `OPENAI_API_KEY`, ...).
pub struct KeyringCredentials;

impl KeyringCredentials {
    fn env_var_name(provider: &str) -> String {
        format!("{}_API_KEY", provider.to_uppercase())
    }

    /// Store a key in the keychain (used by one-time setup).
    pub fn store_api_key(provider: &str, api_key: &str) -> Result<(), CredentialError> {
        let entry = Entry::new(SERVICE_NAME, provider).map_err(CredentialError::Store)?;
        entry.set_password(api_key).map_err(CredentialError::Store)
    }

    /// Delete a key from the keychain. Deleting an absent key is fine.
    pub fn delete_api_key(provider: &str) -> Result<(), CredentialError> {
        let entry = Entry::new(SERVICE_NAME, provider).map_err(CredentialError::Delete)?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(CredentialError::Delete(e)),
        }
    }
}

impl CredentialStore for KeyringCredentials {
    fn api_key(&self, provider: &str) -> Result<String, CredentialError> {
        if let Ok(entry) = Entry::new(SERVICE_NAME, provider) {
            if let Ok(password) = entry.get_password() {
                debug!(provider, "retrieved api key from keychain");
                return Ok(password);
            }
        }

        if let Ok(key) = std::env::var(Self::env_var_name(provider)) {
            if !key.is_empty() {
                debug!(provider, "retrieved api key from environment");
                return Ok(key);
            }
        }

        Err(CredentialError::NotFound(provider.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_variants_render() {
        let err = CredentialError::NotFound("anthropic".to_string());
        assert_eq!(err.to_string(), "api key not found for provider anthropic");
        let err = CredentialError::Store(keyring::Error::NoEntry);
        assert!(err.to_string().starts_with("failed to store api key"));
    }

    #[test]
    fn test_env_var_name() {
        assert_eq!(
            KeyringCredentials::env_var_name("anthropic"),
            "ANTHROPIC_API_KEY"
        );
        assert_eq!(KeyringCredentials::env_var_name("openai"), "OPENAI_API_KEY");
    }
}

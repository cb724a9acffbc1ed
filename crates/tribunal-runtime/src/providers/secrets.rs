//! Secure credential handling for external services.
//!
//! Credentials are wrapped in `secrecy::SecretString` as soon as they are
//! read, never appear in `Debug`/`Display` output, and must be exposed
//! explicitly at the point of use.
//!
//! ```ignore
//! let cred = ApiCredential::from_config_or_env(
//!     config.providers.sanctions_api_key.as_deref(),
//!     "OPENSANCTIONS_API_KEY",
//!     "OpenSanctions API key",
//! )?;
//! request.header("Authorization", format!("ApiKey {}", cred.expose()));
//! ```

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

use super::ProviderError;

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Loaded from the pipeline configuration
    Config,
    /// Loaded from environment variable
    Environment,
    /// Provided programmatically
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Config => write!(f, "config"),
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// A securely-stored API credential.
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Load credential from an environment variable.
    pub fn from_env(env_var: &str, name: &'static str) -> Result<Self, ProviderError> {
        match std::env::var(env_var) {
            Ok(v) if !v.trim().is_empty() => Ok(Self::new(v, CredentialSource::Environment, name)),
            _ => Err(ProviderError::NotConfigured(format!(
                "{} not set: configure '{}' environment variable",
                name, env_var
            ))),
        }
    }

    /// Use the configured value if present, otherwise the environment variable.
    pub fn from_config_or_env(
        configured: Option<&str>,
        env_var: &str,
        name: &'static str,
    ) -> Result<Self, ProviderError> {
        if let Some(value) = configured.filter(|v| !v.trim().is_empty()) {
            return Ok(Self::new(value, CredentialSource::Config, name));
        }

        Self::from_env(env_var, name).map_err(|_| {
            ProviderError::NotConfigured(format!(
                "{} required: set it in config or the {} environment variable",
                name, env_var
            ))
        })
    }

    /// Check if a credential is available without loading it.
    pub fn is_available(configured: Option<&str>, env_var: &str) -> bool {
        configured.is_some_and(|v| !v.trim().is_empty())
            || std::env::var(env_var).is_ok_and(|v| !v.trim().is_empty())
    }

    /// Expose the credential value. Only call where the value is sent.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_redacted() {
        let secret = "os-super-secret-key-12345";
        let cred = ApiCredential::new(secret, CredentialSource::Config, "Test API key");

        let debug = format!("{:?}", cred);
        let display = format!("{}", cred);
        assert!(!debug.contains(secret), "Secret exposed in Debug!");
        assert!(!display.contains(secret), "Secret exposed in Display!");
        assert!(display.contains("config"));
        assert_eq!(cred.expose(), secret);
    }

    #[test]
    fn test_config_preferred_over_env() {
        std::env::set_var("TRIBUNAL_TEST_KEY_PRIORITY", "env-key");
        let cred = ApiCredential::from_config_or_env(
            Some("config-key"),
            "TRIBUNAL_TEST_KEY_PRIORITY",
            "Test key",
        )
        .unwrap();
        assert_eq!(cred.expose(), "config-key");
        assert_eq!(cred.source(), CredentialSource::Config);
        std::env::remove_var("TRIBUNAL_TEST_KEY_PRIORITY");
    }

    #[test]
    fn test_env_fallback() {
        std::env::set_var("TRIBUNAL_TEST_KEY_FALLBACK", "env-key");
        let cred =
            ApiCredential::from_config_or_env(None, "TRIBUNAL_TEST_KEY_FALLBACK", "Test key")
                .unwrap();
        assert_eq!(cred.expose(), "env-key");
        assert_eq!(cred.source(), CredentialSource::Environment);
        std::env::remove_var("TRIBUNAL_TEST_KEY_FALLBACK");
    }

    #[test]
    fn test_missing_credential() {
        let err = ApiCredential::from_config_or_env(
            Some("  "),
            "TRIBUNAL_NONEXISTENT_12345",
            "Test key",
        )
        .unwrap_err();
        assert!(err.to_string().contains("Test key"));
        assert!(err.to_string().contains("TRIBUNAL_NONEXISTENT_12345"));
        assert!(!ApiCredential::is_available(None, "TRIBUNAL_NONEXISTENT_12345"));
        assert!(ApiCredential::is_available(Some("k"), "TRIBUNAL_NONEXISTENT_12345"));
    }
}

//! Coinbase configuration parsed from environment variables.
//!
//! The API key only needs the "view" and "trade" permissions; the bot never
//! calls a transfer or withdrawal endpoint.

use crate::domain::errors::ConfigError;

pub const DEFAULT_API_URL: &str = "https://api.exchange.coinbase.com";

pub const API_KEY_VAR: &str = "COINBASE_API_KEY";
pub const API_SECRET_VAR: &str = "COINBASE_API_SECRET";
pub const API_PASSPHRASE_VAR: &str = "COINBASE_API_PASSPHRASE";

#[derive(Clone)]
pub struct CoinbaseCredentials {
    pub api_key: String,
    /// Base64 encoded, as issued by Coinbase
    pub api_secret: String,
    pub passphrase: String,
}

impl std::fmt::Debug for CoinbaseCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoinbaseCredentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

impl CoinbaseCredentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the three credentials through `lookup`; blank values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &'static str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingCredential { name })
        };

        Ok(Self {
            api_key: read(API_KEY_VAR)?,
            api_secret: read(API_SECRET_VAR)?,
            passphrase: read(API_PASSPHRASE_VAR)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CoinbaseConfig {
    pub api_url: String,
    /// Absent in paper mode when no keys are configured
    pub credentials: Option<CoinbaseCredentials>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_reads_all_three_keys() {
        let creds = CoinbaseCredentials::from_lookup(lookup(&[
            (API_KEY_VAR, "key"),
            (API_SECRET_VAR, "c2VjcmV0"),
            (API_PASSPHRASE_VAR, " pass "),
        ]))
        .unwrap();

        assert_eq!(creds.api_key, "key");
        assert_eq!(creds.passphrase, "pass");
    }

    #[test]
    fn test_missing_passphrase_is_named() {
        let err = CoinbaseCredentials::from_lookup(lookup(&[
            (API_KEY_VAR, "key"),
            (API_SECRET_VAR, "c2VjcmV0"),
            (API_PASSPHRASE_VAR, "   "),
        ]))
        .unwrap_err();

        assert!(matches!(
            err,
            ConfigError::MissingCredential {
                name: API_PASSPHRASE_VAR
            }
        ));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = CoinbaseCredentials {
            api_key: "key".to_string(),
            api_secret: "topsecret".to_string(),
            passphrase: "hunter2".to_string(),
        };
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("topsecret"));
        assert!(!debug.contains("hunter2"));
    }
}

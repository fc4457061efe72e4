//! Coinbase Exchange request signing
//!
//! `CB-ACCESS-SIGN` is the base64 HMAC-SHA256 of
//! `timestamp + METHOD + request_path + body`, keyed with the base64-decoded
//! API secret.

use crate::domain::errors::ExchangeError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use reqwest_middleware::RequestBuilder;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct RequestSigner {
    api_key: String,
    passphrase: String,
    mac: HmacSha256,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}

impl RequestSigner {
    pub fn new(api_key: &str, api_secret: &str, passphrase: &str) -> Result<Self, ExchangeError> {
        let key = STANDARD
            .decode(api_secret.trim())
            .map_err(|e| ExchangeError::InvalidSecret {
                reason: format!("not valid base64: {}", e),
            })?;
        let mac = HmacSha256::new_from_slice(&key).map_err(|e| ExchangeError::InvalidSecret {
            reason: e.to_string(),
        })?;

        Ok(Self {
            api_key: api_key.to_string(),
            passphrase: passphrase.to_string(),
            mac,
        })
    }

    pub fn sign(&self, timestamp: &str, method: &str, request_path: &str, body: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(timestamp.as_bytes());
        mac.update(method.to_uppercase().as_bytes());
        mac.update(request_path.as_bytes());
        mac.update(body.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }

    /// Adds the four `CB-ACCESS-*` headers to a request
    pub fn authorize(
        &self,
        builder: RequestBuilder,
        method: &str,
        request_path: &str,
        body: &str,
    ) -> RequestBuilder {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = self.sign(&timestamp, method, request_path, body);

        builder
            .header("CB-ACCESS-KEY", &self.api_key)
            .header("CB-ACCESS-SIGN", signature)
            .header("CB-ACCESS-TIMESTAMP", timestamp)
            .header("CB-ACCESS-PASSPHRASE", &self.passphrase)
    }
}

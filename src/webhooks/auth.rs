use crate::config::AppConfig;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Decides whether an inbound webhook really came from the carrier.
pub trait WebhookAuthenticator: Send + Sync {
    fn verify(&self, headers: &HeaderMap, body: &[u8]) -> bool;

    fn name(&self) -> &'static str;
}

/// Accepts every delivery. Used when no webhook secret is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl WebhookAuthenticator for AcceptAll {
    fn verify(&self, _headers: &HeaderMap, _body: &[u8]) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "accept-all"
    }
}

/// Hex HMAC-SHA256 of the raw body, carried in a configurable header.
pub struct HmacSha256Authenticator {
    secret: Vec<u8>,
    header: String,
}

impl HmacSha256Authenticator {
    pub fn new(secret: impl AsRef<[u8]>, header: impl Into<String>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            header: header.into().to_ascii_lowercase(),
        }
    }

    pub fn sign(&self, body: &[u8]) -> String {
        hex::encode(self.mac(body).finalize().into_bytes())
    }

    fn mac(&self, body: &[u8]) -> HmacSha256 {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .expect("HMAC can take key of any size");
        mac.update(body);
        mac
    }
}

impl WebhookAuthenticator for HmacSha256Authenticator {
    fn verify(&self, headers: &HeaderMap, body: &[u8]) -> bool {
        let Some(provided) = headers
            .get(self.header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
        else {
            warn!(header = %self.header, "webhook signature header missing");
            return false;
        };

        let Ok(signature) = hex::decode(provided) else {
            warn!("webhook signature is not hex");
            return false;
        };

        // verify_slice compares in constant time
        self.mac(body).verify_slice(&signature).is_ok()
    }

    fn name(&self) -> &'static str {
        "hmac-sha256"
    }
}

/// HMAC verification when a webhook secret is configured, otherwise accept all.
pub fn authenticator_from_config(cfg: &AppConfig) -> Arc<dyn WebhookAuthenticator> {
    match cfg
        .carrier_webhook_secret
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        Some(secret) => {
            info!(header = %cfg.carrier_webhook_signature_header, "carrier webhook signatures enforced");
            Arc::new(HmacSha256Authenticator::new(
                secret,
                cfg.carrier_webhook_signature_header.clone(),
            ))
        }
        None => {
            warn!("carrier webhook signatures not verified; no secret configured");
            Arc::new(AcceptAll)
        }
    }
}

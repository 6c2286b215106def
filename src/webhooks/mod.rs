/// Inbound carrier webhooks
pub mod auth;
pub mod carrier;

pub use auth::{
    authenticator_from_config, AcceptAll, HmacSha256Authenticator, WebhookAuthenticator,
};
pub use carrier::{IngestOutcome, RawCarrierEvent, WebhookIngestor};

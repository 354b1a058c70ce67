use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::event::WebhookEvent;

mod live;
mod mock;
pub mod verify;

pub use live::LiveStripeService;
pub use mock::MockStripeService;
pub use verify::{VerifyError, WebhookVerifier};

#[derive(Debug, thiserror::Error)]
pub enum StripeServiceError {
    #[error("stripe api error: {0}")]
    Api(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

/// Subscription as resolved from the provider by id. Reference read only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderSubscription {
    pub id: String,
    pub status: String,
    /// Unix timestamp (seconds) when the current period started
    pub current_period_start: Option<i64>,
    /// Unix timestamp (seconds) when the current period ends
    pub current_period_end: Option<i64>,
    pub cancel_at_period_end: bool,
    pub latest_invoice: Option<String>,
    pub price_id: Option<String>,
    pub product_id: Option<String>,
}

/// Invoice as resolved from the provider by id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderInvoice {
    pub id: String,
    pub payment_intent: Option<String>,
    pub amount_paid: i64,
    pub currency: Option<String>,
    pub subscription: Option<String>,
}

/// Everything the engine needs from the payment provider: inbound
/// verification plus two reference reads. No mutation.
#[async_trait]
pub trait StripeService: Send + Sync {
    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<WebhookEvent, VerifyError>;

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ProviderSubscription, StripeServiceError>;

    async fn retrieve_invoice(
        &self,
        invoice_id: &str,
    ) -> Result<ProviderInvoice, StripeServiceError>;
}

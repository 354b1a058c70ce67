use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }
}

/// Fields written when a payment row is created. `stripe_payment_id` is the
/// natural key: at most one row ever exists per payment-intent id.
#[derive(Debug, Clone, Serialize)]
pub struct NewPayment {
    pub stripe_payment_id: String,
    pub user: Option<String>,
    /// Major currency units; provider amounts are divided by 100 before
    /// they reach this struct.
    pub amount: f64,
    pub currency: String,
    pub status: PaymentStatus,
    pub metadata: Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Passive,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Passive => "passive",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }
}

/// Fields written on a subscription upsert. The checkout handler writes the
/// resolved package and payment ids in the same call, so a row never exists
/// without its linkage.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionWrite {
    pub user: String,
    pub stripe_subscription_id: String,
    pub package: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub start_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_date: Option<OffsetDateTime>,
    pub cancel_at_period_end: bool,
    /// Mirror of the provider's subscription status string.
    pub payment_status: String,
    pub status: SubscriptionStatus,
    pub payment: Option<String>,
}

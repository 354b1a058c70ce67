use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::event::{EventKind, WebhookEvent};
use crate::models::payment::NewPayment;
use crate::models::subscription::SubscriptionWrite;
use crate::records::{record_id, GatewayError, RecordGateway, RecordQuery};
use crate::state::AppState;

mod checkout;
mod invoice;
mod subscription;

pub const PAYMENTS_COLLECTION: &str = "payments";
pub const SUBSCRIPTIONS_COLLECTION: &str = "subscriptions";
pub const PACKAGES_COLLECTION: &str = "packages";
pub const USERS_COLLECTION: &str = "directus_users";

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("no user found for stripe customer {customer_id}")]
    UserNotFound { customer_id: String },
    #[error("unable to resolve a user for checkout session {session_id}")]
    UnresolvedCheckoutUser { session_id: String },
    #[error("no package found for price {price_id} / product {product_id}")]
    PackageNotFound {
        price_id: String,
        product_id: String,
    },
    #[error("no subscription row matches stripe subscription {subscription_id}")]
    SubscriptionNotFound { subscription_id: String },
    #[error("event is missing required field {0}")]
    MissingField(&'static str),
    #[error("record encoding failed: {0}")]
    Encode(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("stripe lookup failed: {0}")]
    Provider(#[from] crate::services::stripe::StripeServiceError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A handler ran and state was brought in line with the event.
    Reconciled,
    /// Recognized (or unknown) event with no reconciliation to perform.
    Acknowledged,
}

/// Flat dispatch over the event kind. State lives in the payment and
/// subscription records, never here.
pub async fn dispatch(state: &AppState, event: &WebhookEvent) -> Result<Outcome, ReconcileError> {
    match &event.kind {
        EventKind::CheckoutSessionCompleted(session) => {
            checkout::completed(state, session).await?;
            Ok(Outcome::Reconciled)
        }
        EventKind::InvoicePaymentSucceeded(inv) => {
            invoice::payment_succeeded(state, inv).await?;
            Ok(Outcome::Reconciled)
        }
        EventKind::CustomerSubscriptionDeleted(sub) => {
            subscription::deleted(state, sub).await?;
            Ok(Outcome::Reconciled)
        }
        EventKind::InvoicePaymentFailed(inv) => {
            // Reserved for user notification; no state change.
            warn!(invoice = %inv.id, customer = ?inv.customer, "invoice payment failed");
            Ok(Outcome::Acknowledged)
        }
        EventKind::CustomerSubscriptionCreated(sub)
        | EventKind::CustomerSubscriptionUpdated(sub) => {
            // Checkout completion already writes everything these carry.
            info!(subscription = %sub.id, event_type = event.kind.name(), "subscription lifecycle event acknowledged");
            Ok(Outcome::Acknowledged)
        }
        EventKind::PaymentIntentSucceeded(pi) => {
            // Payment rows are written by the checkout and invoice handlers;
            // creating one here as well would duplicate the intent.
            info!(payment_intent = %pi.id, "payment intent succeeded; logged only");
            Ok(Outcome::Acknowledged)
        }
        EventKind::PaymentIntentFailed(pi) => {
            warn!(payment_intent = %pi.id, "payment intent failed");
            Ok(Outcome::Acknowledged)
        }
        EventKind::Other(event_type) => {
            info!(event_type, "unhandled stripe event acknowledged");
            Ok(Outcome::Acknowledged)
        }
    }
}

pub(crate) async fn find_user_by_customer(
    records: &Arc<dyn RecordGateway>,
    customer_id: &str,
) -> Result<Option<Value>, GatewayError> {
    let query = RecordQuery::filtered(json!({ "stripe_customer_id": { "_eq": customer_id } }))
        .with_limit(1);
    Ok(records
        .read_by_query(USERS_COLLECTION, &query)
        .await?
        .into_iter()
        .next())
}

/// Lookup-before-create keyed on the provider payment-intent id. Returns the
/// payment row id either way, so redelivery reuses the existing row.
pub(crate) async fn lookup_or_create_payment(
    records: &Arc<dyn RecordGateway>,
    payment: &NewPayment,
) -> Result<String, ReconcileError> {
    let query = RecordQuery::filtered(
        json!({ "stripe_payment_id": { "_eq": payment.stripe_payment_id } }),
    )
    .with_limit(1);
    if let Some(existing) = records
        .read_by_query(PAYMENTS_COLLECTION, &query)
        .await?
        .into_iter()
        .next()
    {
        if let Some(id) = record_id(&existing) {
            info!(payment = %payment.stripe_payment_id, "payment already recorded; reusing");
            return Ok(id);
        }
    }

    let fields = serde_json::to_value(payment).map_err(|e| ReconcileError::Encode(e.to_string()))?;
    Ok(records.create_one(PAYMENTS_COLLECTION, fields).await?)
}

/// Update-or-create preserving the one-active-or-passive-row-per-user
/// invariant: an existing qualifying row is updated in place, otherwise a
/// fresh row is created. All resolved linkage travels in the same write.
pub(crate) async fn upsert_subscription(
    records: &Arc<dyn RecordGateway>,
    write: &SubscriptionWrite,
) -> Result<String, ReconcileError> {
    let filter = json!({ "_and": [
        { "user": { "_eq": write.user } },
        { "status": { "_in": ["active", "passive"] } }
    ]});
    let query = RecordQuery::filtered(filter).with_limit(1);
    let fields = serde_json::to_value(write).map_err(|e| ReconcileError::Encode(e.to_string()))?;

    if let Some(existing) = records
        .read_by_query(SUBSCRIPTIONS_COLLECTION, &query)
        .await?
        .into_iter()
        .next()
    {
        if let Some(id) = record_id(&existing) {
            records
                .update_one(SUBSCRIPTIONS_COLLECTION, &id, fields)
                .await?;
            return Ok(id);
        }
    }

    Ok(records.create_one(SUBSCRIPTIONS_COLLECTION, fields).await?)
}

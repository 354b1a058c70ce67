use serde_json::{json, Value};
use time::OffsetDateTime;
use tracing::info;

use super::{
    find_user_by_customer, lookup_or_create_payment, upsert_subscription, ReconcileError,
    PACKAGES_COLLECTION, USERS_COLLECTION,
};
use crate::models::event::CheckoutSession;
use crate::models::payment::{NewPayment, PaymentStatus};
use crate::models::subscription::{SubscriptionStatus, SubscriptionWrite};
use crate::records::{record_id, RecordQuery};
use crate::state::AppState;
use crate::utils::{from_unix, minor_to_major};

/// `checkout.session.completed` in subscription mode: resolve the provider
/// subscription and its invoice, resolve the package from the price, then
/// write payment, subscription and user in that order. Every step is keyed
/// by a natural id, so a redelivered or half-processed event converges.
pub async fn completed(state: &AppState, session: &CheckoutSession) -> Result<(), ReconcileError> {
    if session.mode.as_deref().is_some_and(|m| m != "subscription") {
        info!(session = %session.id, mode = ?session.mode, "ignoring non-subscription checkout");
        return Ok(());
    }

    let subscription_id = session
        .subscription
        .as_deref()
        .ok_or(ReconcileError::MissingField("subscription"))?;
    let provider_sub = state.stripe.retrieve_subscription(subscription_id).await?;

    let invoice_id = provider_sub
        .latest_invoice
        .as_deref()
        .ok_or(ReconcileError::MissingField("latest_invoice"))?;
    let invoice = state.stripe.retrieve_invoice(invoice_id).await?;

    let user_id = resolve_user(state, session).await?;

    let price_id = provider_sub
        .price_id
        .as_deref()
        .ok_or(ReconcileError::MissingField("price"))?;
    let product_id = provider_sub
        .product_id
        .as_deref()
        .ok_or(ReconcileError::MissingField("product"))?;
    let package_id = find_package(state, price_id, product_id).await?;

    let payment = NewPayment {
        stripe_payment_id: invoice
            .payment_intent
            .clone()
            .ok_or(ReconcileError::MissingField("payment_intent"))?,
        user: Some(user_id.clone()),
        amount: minor_to_major(invoice.amount_paid),
        currency: invoice
            .currency
            .clone()
            .ok_or(ReconcileError::MissingField("currency"))?,
        status: PaymentStatus::Completed,
        metadata: Value::Object(session.metadata.clone()),
        created_at: OffsetDateTime::now_utc(),
    };
    let payment_row = lookup_or_create_payment(&state.records, &payment).await?;

    let subscription_row = upsert_subscription(
        &state.records,
        &SubscriptionWrite {
            user: user_id.clone(),
            stripe_subscription_id: provider_sub.id.clone(),
            package: Some(package_id.clone()),
            start_date: provider_sub.current_period_start.and_then(from_unix),
            end_date: provider_sub.current_period_end.and_then(from_unix),
            cancel_at_period_end: provider_sub.cancel_at_period_end,
            payment_status: provider_sub.status.clone(),
            status: SubscriptionStatus::Active,
            payment: Some(payment_row.clone()),
        },
    )
    .await?;

    let mut user_fields = serde_json::Map::new();
    if let Some(customer) = &session.customer {
        user_fields.insert("stripe_customer_id".into(), json!(customer));
    }
    user_fields.insert("package_id".into(), json!(package_id));
    state
        .records
        .update_one(USERS_COLLECTION, &user_id, Value::Object(user_fields))
        .await?;

    info!(
        session = %session.id,
        user = %user_id,
        subscription = %subscription_row,
        payment = %payment_row,
        "checkout reconciled"
    );
    Ok(())
}

/// User resolution order: session metadata, then the client reference id,
/// then the customer id mapping already on record.
async fn resolve_user(state: &AppState, session: &CheckoutSession) -> Result<String, ReconcileError> {
    if let Some(user_id) = session.metadata.get("user_id").and_then(|v| v.as_str()) {
        return Ok(user_id.to_string());
    }
    if let Some(user_id) = session.client_reference_id.as_deref() {
        return Ok(user_id.to_string());
    }
    if let Some(customer_id) = session.customer.as_deref() {
        if let Some(user) = find_user_by_customer(&state.records, customer_id).await? {
            if let Some(id) = record_id(&user) {
                return Ok(id);
            }
        }
    }
    Err(ReconcileError::UnresolvedCheckoutUser {
        session_id: session.id.clone(),
    })
}

async fn find_package(
    state: &AppState,
    price_id: &str,
    product_id: &str,
) -> Result<String, ReconcileError> {
    let filter = json!({ "_and": [
        { "stripe_price_id": { "_eq": price_id } },
        { "stripe_product_id": { "_eq": product_id } }
    ]});
    let query = RecordQuery::filtered(filter).with_limit(1);
    state
        .records
        .read_by_query(PACKAGES_COLLECTION, &query)
        .await?
        .first()
        .and_then(record_id)
        .ok_or_else(|| ReconcileError::PackageNotFound {
            price_id: price_id.to_string(),
            product_id: product_id.to_string(),
        })
}

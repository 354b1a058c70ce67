use serde_json::{json, Value};
use time::OffsetDateTime;
use tracing::info;

use super::{
    find_user_by_customer, lookup_or_create_payment, ReconcileError, SUBSCRIPTIONS_COLLECTION,
};
use crate::models::event::Invoice;
use crate::models::payment::{NewPayment, PaymentStatus};
use crate::records::record_id;
use crate::state::AppState;
use crate::utils::{from_unix, minor_to_major, rfc3339};

/// `invoice.payment_succeeded`: record the charge and refresh the linked
/// subscription's billing state. Covers renewals, where no checkout event
/// will arrive.
pub async fn payment_succeeded(state: &AppState, invoice: &Invoice) -> Result<(), ReconcileError> {
    let customer_id = invoice
        .customer
        .as_deref()
        .ok_or(ReconcileError::MissingField("customer"))?;
    let user = find_user_by_customer(&state.records, customer_id)
        .await?
        .ok_or_else(|| ReconcileError::UserNotFound {
            customer_id: customer_id.to_string(),
        })?;
    let user_id = record_id(&user)
        .ok_or_else(|| ReconcileError::Encode("user record carried no id".into()))?;

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
        metadata: Value::Object(invoice.metadata.clone()),
        created_at: OffsetDateTime::now_utc(),
    };
    let payment_row = lookup_or_create_payment(&state.records, &payment).await?;

    if let Some(subscription_id) = invoice.subscription.as_deref() {
        let provider_sub = state.stripe.retrieve_subscription(subscription_id).await?;
        let mut fields = serde_json::Map::new();
        fields.insert("payment_status".into(), json!(provider_sub.status));
        fields.insert("payment".into(), json!(payment_row));
        if let Some(end) = provider_sub.current_period_end.and_then(from_unix) {
            fields.insert("end_date".into(), json!(rfc3339(end)));
        }

        let updated = state
            .records
            .update_by_query(
                SUBSCRIPTIONS_COLLECTION,
                &json!({ "stripe_subscription_id": { "_eq": subscription_id } }),
                Value::Object(fields),
            )
            .await?;
        if updated == 0 {
            // Out-of-order delivery: the checkout event has not landed yet.
            // Fail so the provider redelivers once it has.
            return Err(ReconcileError::SubscriptionNotFound {
                subscription_id: subscription_id.to_string(),
            });
        }
    }

    info!(invoice = %invoice.id, user = %user_id, payment = %payment_row, "invoice reconciled");
    Ok(())
}

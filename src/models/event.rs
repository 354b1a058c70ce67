use serde::Deserialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// Checkout session object carried by `checkout.session.completed`.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Invoice object carried by `invoice.payment_succeeded` / `invoice.payment_failed`.
#[derive(Debug, Clone, Deserialize)]
pub struct Invoice {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub amount_paid: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Subscription object carried by the `customer.subscription.*` lifecycle events.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub ended_at: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default)]
    pub current_period_start: Option<i64>,
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

/// Payment-intent object carried by `payment_intent.succeeded` / `payment_intent.payment_failed`.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Closed set of event kinds the router dispatches on. Payloads are validated
/// here, at the parse boundary, so handlers never probe untyped json.
#[derive(Debug, Clone)]
pub enum EventKind {
    CheckoutSessionCompleted(CheckoutSession),
    InvoicePaymentSucceeded(Invoice),
    InvoicePaymentFailed(Invoice),
    CustomerSubscriptionCreated(SubscriptionObject),
    CustomerSubscriptionUpdated(SubscriptionObject),
    CustomerSubscriptionDeleted(SubscriptionObject),
    PaymentIntentSucceeded(PaymentIntent),
    PaymentIntentFailed(PaymentIntent),
    Other(String),
}

impl EventKind {
    /// The provider's event type string, as journaled in the audit log.
    pub fn name(&self) -> &str {
        match self {
            EventKind::CheckoutSessionCompleted(_) => "checkout.session.completed",
            EventKind::InvoicePaymentSucceeded(_) => "invoice.payment_succeeded",
            EventKind::InvoicePaymentFailed(_) => "invoice.payment_failed",
            EventKind::CustomerSubscriptionCreated(_) => "customer.subscription.created",
            EventKind::CustomerSubscriptionUpdated(_) => "customer.subscription.updated",
            EventKind::CustomerSubscriptionDeleted(_) => "customer.subscription.deleted",
            EventKind::PaymentIntentSucceeded(_) => "payment_intent.succeeded",
            EventKind::PaymentIntentFailed(_) => "payment_intent.payment_failed",
            EventKind::Other(ty) => ty,
        }
    }
}

/// A verified provider notification. Immutable once parsed; handlers only
/// ever read from it.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub id: String,
    pub kind: EventKind,
    pub raw: Value,
    pub received_at: OffsetDateTime,
}

#[derive(Deserialize)]
struct Envelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: EnvelopeData,
}

#[derive(Deserialize)]
struct EnvelopeData {
    object: Value,
}

impl WebhookEvent {
    pub fn from_json(raw: Value) -> Result<Self, serde_json::Error> {
        let envelope: Envelope = serde_json::from_value(raw.clone())?;
        let object = envelope.data.object;

        let kind = match envelope.event_type.as_str() {
            "checkout.session.completed" => {
                EventKind::CheckoutSessionCompleted(serde_json::from_value(object)?)
            }
            "invoice.payment_succeeded" => {
                EventKind::InvoicePaymentSucceeded(serde_json::from_value(object)?)
            }
            "invoice.payment_failed" => {
                EventKind::InvoicePaymentFailed(serde_json::from_value(object)?)
            }
            "customer.subscription.created" => {
                EventKind::CustomerSubscriptionCreated(serde_json::from_value(object)?)
            }
            "customer.subscription.updated" => {
                EventKind::CustomerSubscriptionUpdated(serde_json::from_value(object)?)
            }
            "customer.subscription.deleted" => {
                EventKind::CustomerSubscriptionDeleted(serde_json::from_value(object)?)
            }
            "payment_intent.succeeded" => {
                EventKind::PaymentIntentSucceeded(serde_json::from_value(object)?)
            }
            "payment_intent.payment_failed" => {
                EventKind::PaymentIntentFailed(serde_json::from_value(object)?)
            }
            other => EventKind::Other(other.to_string()),
        };

        Ok(WebhookEvent {
            id: envelope.id,
            kind,
            raw,
            received_at: OffsetDateTime::now_utc(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_checkout_session_completed() {
        let raw = json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_1",
                "mode": "subscription",
                "customer": "cus_1",
                "subscription": "sub_1",
                "metadata": { "user_id": "u-1" }
            }}
        });

        let event = WebhookEvent::from_json(raw).unwrap();
        assert_eq!(event.id, "evt_1");
        match event.kind {
            EventKind::CheckoutSessionCompleted(session) => {
                assert_eq!(session.id, "cs_1");
                assert_eq!(session.subscription.as_deref(), Some("sub_1"));
                assert_eq!(
                    session.metadata.get("user_id").and_then(|v| v.as_str()),
                    Some("u-1")
                );
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn unrecognized_type_maps_to_other() {
        let raw = json!({
            "id": "evt_2",
            "type": "charge.refunded",
            "data": { "object": { "id": "ch_1" } }
        });

        let event = WebhookEvent::from_json(raw).unwrap();
        assert!(matches!(event.kind, EventKind::Other(ref ty) if ty == "charge.refunded"));
        assert_eq!(event.kind.name(), "charge.refunded");
    }

    #[test]
    fn missing_data_object_is_an_error() {
        let raw = json!({ "id": "evt_3", "type": "invoice.payment_succeeded" });
        assert!(WebhookEvent::from_json(raw).is_err());
    }

    #[test]
    fn invoice_defaults_tolerate_absent_fields() {
        let raw = json!({
            "id": "evt_4",
            "type": "invoice.payment_failed",
            "data": { "object": { "id": "in_1" } }
        });

        let event = WebhookEvent::from_json(raw).unwrap();
        match event.kind {
            EventKind::InvoicePaymentFailed(invoice) => {
                assert_eq!(invoice.amount_paid, 0);
                assert!(invoice.customer.is_none());
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }
}

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, info, warn};

use crate::ledger::{Disposition, EventLedger};
use crate::reconcile;
use crate::responses::JsonResponse;
use crate::state::AppState;

pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

fn received() -> Response {
    Json(serde_json::json!({ "received": true })).into_response()
}

/// Single ingress for provider notifications. Verification gates every write:
/// nothing below this point runs on an unverified payload.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = match headers.get("stripe-signature").and_then(|v| v.to_str().ok()) {
        Some(sig) => sig,
        None => {
            warn!("webhook delivery without a stripe-signature header");
            return JsonResponse::bad_request("missing stripe-signature header").into_response();
        }
    };

    let event = match state.stripe.verify_webhook(&body, signature) {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, "webhook signature verification failed");
            return JsonResponse::bad_request(&err.to_string()).into_response();
        }
    };

    let ledger = EventLedger::new(state.records.clone());
    match ledger.record_received(&event).await {
        Ok(Disposition::AlreadyCompleted) => {
            info!(event = %event.id, event_type = event.kind.name(), "event already reconciled; skipping");
            return received();
        }
        Ok(Disposition::Fresh) => {}
        Ok(Disposition::Replay) => {
            info!(event = %event.id, event_type = event.kind.name(), "replaying event");
        }
        Err(err) => {
            error!(event = %event.id, error = %err, "failed to journal event");
            return JsonResponse::server_error("unable to journal event").into_response();
        }
    }

    match reconcile::dispatch(&state, &event).await {
        Ok(outcome) => {
            if let Err(err) = ledger.mark_completed(&event.id).await {
                error!(event = %event.id, error = %err, "failed to mark event completed");
                return JsonResponse::server_error("unable to journal event").into_response();
            }
            info!(event = %event.id, event_type = event.kind.name(), ?outcome, "event processed");
            received()
        }
        Err(err) => {
            let message = err.to_string();
            error!(event = %event.id, event_type = event.kind.name(), error = %message, "reconciliation failed");
            if let Err(journal_err) = ledger.mark_failed(&event.id, &message).await {
                error!(event = %event.id, error = %journal_err, "failed to mark event failed");
            }
            JsonResponse::bad_request(&message).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DirectusSettings, StripeSettings};
    use crate::ledger::EVENT_LOG_COLLECTION;
    use crate::reconcile::{PAYMENTS_COLLECTION, SUBSCRIPTIONS_COLLECTION};
    use crate::records::InMemoryGateway;
    use crate::services::stripe::{
        LiveStripeService, MockStripeService, ProviderInvoice, ProviderSubscription,
    };
    use axum::http::StatusCode;
    use serde_json::json;
    use std::sync::Arc;

    fn test_config() -> Arc<Config> {
        Arc::new(Config {
            stripe: StripeSettings {
                secret_key: "sk_test_stub".into(),
                webhook_secret: "whsec_stub".into(),
                tolerance_seconds: 300,
            },
            directus: DirectusSettings {
                base_url: "http://directus.test".into(),
                access_token: "token".into(),
            },
            port: 0,
        })
    }

    fn mock_state(
        gateway: Arc<InMemoryGateway>,
        stripe: Arc<MockStripeService>,
    ) -> AppState {
        AppState {
            records: gateway,
            stripe,
            config: test_config(),
        }
    }

    fn signed_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("stripe-signature", "t=1,v1=stub".parse().unwrap());
        headers
    }

    fn body_for(event: &serde_json::Value) -> Bytes {
        Bytes::from(serde_json::to_vec(event).unwrap())
    }

    fn checkout_event() -> serde_json::Value {
        json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_1",
                "mode": "subscription",
                "customer": "cus_1",
                "subscription": "sub_1",
                "metadata": { "user_id": "u-1" }
            }}
        })
    }

    fn seeded_stripe() -> Arc<MockStripeService> {
        Arc::new(
            MockStripeService::new()
                .with_subscription(ProviderSubscription {
                    id: "sub_1".into(),
                    status: "active".into(),
                    current_period_start: Some(1_700_000_000),
                    current_period_end: Some(1_702_592_000),
                    cancel_at_period_end: false,
                    latest_invoice: Some("in_1".into()),
                    price_id: Some("price_1".into()),
                    product_id: Some("prod_1".into()),
                })
                .with_invoice(ProviderInvoice {
                    id: "in_1".into(),
                    payment_intent: Some("pi_1".into()),
                    amount_paid: 1999,
                    currency: Some("usd".into()),
                    subscription: Some("sub_1".into()),
                }),
        )
    }

    fn seeded_gateway() -> Arc<InMemoryGateway> {
        let gateway = Arc::new(InMemoryGateway::new());
        gateway.seed("directus_users", json!({"id": "u-1", "email": "seller@example.com"}));
        gateway.seed(
            "packages",
            json!({"id": "pkg-1", "stripe_price_id": "price_1", "stripe_product_id": "prod_1"}),
        );
        gateway
    }

    #[tokio::test]
    async fn missing_signature_header_is_rejected_before_parsing() {
        let gateway = Arc::new(InMemoryGateway::new());
        let state = mock_state(gateway.clone(), Arc::new(MockStripeService::new()));

        let response = webhook(State(state), HeaderMap::new(), body_for(&checkout_event())).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(gateway.records(EVENT_LOG_COLLECTION).is_empty());
    }

    #[tokio::test]
    async fn invalid_signature_touches_nothing() {
        let gateway = Arc::new(InMemoryGateway::new());
        let state = AppState {
            records: gateway.clone(),
            stripe: Arc::new(LiveStripeService::new(
                reqwest::Client::new(),
                &test_config().stripe,
            )),
            config: test_config(),
        };

        let mut headers = HeaderMap::new();
        headers.insert("stripe-signature", "t=1,v1=00ff".parse().unwrap());
        let response = webhook(State(state), headers, body_for(&checkout_event())).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(gateway.records(EVENT_LOG_COLLECTION).is_empty());
        assert!(gateway.records(PAYMENTS_COLLECTION).is_empty());
    }

    #[tokio::test]
    async fn unknown_event_is_acknowledged_and_journaled() {
        let gateway = Arc::new(InMemoryGateway::new());
        let state = mock_state(gateway.clone(), Arc::new(MockStripeService::new()));

        let event = json!({
            "id": "evt_9",
            "type": "charge.refunded",
            "data": { "object": { "id": "ch_1" } }
        });
        let response = webhook(State(state), signed_headers(), body_for(&event)).await;

        assert_eq!(response.status(), StatusCode::OK);
        let entries = gateway.records(EVENT_LOG_COLLECTION);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["status"], "completed");
        assert!(gateway.records(PAYMENTS_COLLECTION).is_empty());
    }

    #[tokio::test]
    async fn completed_event_short_circuits_without_rerunning_handlers() {
        let gateway = seeded_gateway();
        gateway.seed(
            EVENT_LOG_COLLECTION,
            json!({
                "id": "log-1",
                "event_id": "evt_1",
                "event_type": "checkout.session.completed",
                "status": "completed"
            }),
        );
        let stripe = seeded_stripe();
        let state = mock_state(gateway.clone(), stripe.clone());

        let response = webhook(State(state), signed_headers(), body_for(&checkout_event())).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(*stripe.subscription_reads.lock().unwrap(), 0);
        assert!(gateway.records(PAYMENTS_COLLECTION).is_empty());
    }

    #[tokio::test]
    async fn handler_failure_marks_the_entry_failed() {
        let gateway = Arc::new(InMemoryGateway::new());
        let state = mock_state(gateway.clone(), Arc::new(MockStripeService::new()));

        let event = json!({
            "id": "evt_5",
            "type": "invoice.payment_succeeded",
            "data": { "object": {
                "id": "in_1",
                "customer": "cus_unknown",
                "payment_intent": "pi_1",
                "amount_paid": 1999,
                "currency": "usd"
            }}
        });
        let response = webhook(State(state), signed_headers(), body_for(&event)).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let entries = gateway.records(EVENT_LOG_COLLECTION);
        assert_eq!(entries[0]["status"], "failed");
        assert!(entries[0]["error"]
            .as_str()
            .unwrap()
            .contains("cus_unknown"));
    }

    #[tokio::test]
    async fn redelivered_checkout_converges_to_single_rows() {
        let gateway = seeded_gateway();
        let state = mock_state(gateway.clone(), seeded_stripe());

        let first = webhook(
            State(state.clone()),
            signed_headers(),
            body_for(&checkout_event()),
        )
        .await;
        let second = webhook(State(state), signed_headers(), body_for(&checkout_event())).await;

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(gateway.records(PAYMENTS_COLLECTION).len(), 1);
        assert_eq!(gateway.records(SUBSCRIPTIONS_COLLECTION).len(), 1);
        let entries = gateway.records(EVENT_LOG_COLLECTION);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["status"], "completed");
    }
}

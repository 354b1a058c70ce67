use serde_json::json;
use time::OffsetDateTime;
use tracing::info;

use super::{ReconcileError, SUBSCRIPTIONS_COLLECTION};
use crate::models::event::SubscriptionObject;
use crate::utils::{from_unix, rfc3339};
use crate::state::AppState;

/// `customer.subscription.deleted`: close out the matching row. The cancelled
/// row drops out of the active/passive pool, so the user's next checkout
/// creates a fresh one.
pub async fn deleted(state: &AppState, sub: &SubscriptionObject) -> Result<(), ReconcileError> {
    let ended = sub
        .ended_at
        .and_then(from_unix)
        .unwrap_or_else(OffsetDateTime::now_utc);

    let updated = state
        .records
        .update_by_query(
            SUBSCRIPTIONS_COLLECTION,
            &json!({ "stripe_subscription_id": { "_eq": sub.id } }),
            json!({
                "status": "cancelled",
                "payment_status": sub.status.as_deref().unwrap_or("canceled"),
                "end_date": rfc3339(ended),
            }),
        )
        .await?;
    if updated == 0 {
        return Err(ReconcileError::SubscriptionNotFound {
            subscription_id: sub.id.clone(),
        });
    }

    info!(subscription = %sub.id, end_date = %rfc3339(ended), "subscription cancelled");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DirectusSettings, StripeSettings};
    use crate::records::InMemoryGateway;
    use crate::services::stripe::MockStripeService;
    use std::sync::Arc;

    fn test_state(gateway: Arc<InMemoryGateway>) -> AppState {
        AppState {
            records: gateway,
            stripe: Arc::new(MockStripeService::new()),
            config: Arc::new(Config {
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
            }),
        }
    }

    fn cancelled_subscription() -> SubscriptionObject {
        SubscriptionObject {
            id: "sub_1".into(),
            status: Some("canceled".into()),
            customer: Some("cus_1".into()),
            ended_at: Some(1_700_000_000),
            cancel_at_period_end: false,
            current_period_start: None,
            current_period_end: None,
        }
    }

    #[tokio::test]
    async fn cancellation_closes_the_matching_row() {
        let gateway = Arc::new(InMemoryGateway::new());
        gateway.seed(
            SUBSCRIPTIONS_COLLECTION,
            json!({"id": "s-1", "user": "u-1", "status": "active", "stripe_subscription_id": "sub_1"}),
        );
        let state = test_state(gateway.clone());

        deleted(&state, &cancelled_subscription()).await.unwrap();

        let rows = gateway.records(SUBSCRIPTIONS_COLLECTION);
        assert_eq!(rows[0]["status"], "cancelled");
        assert_eq!(rows[0]["payment_status"], "canceled");
        assert_eq!(rows[0]["end_date"], "2023-11-14T22:13:20Z");
    }

    #[tokio::test]
    async fn missing_row_is_an_error() {
        let gateway = Arc::new(InMemoryGateway::new());
        let state = test_state(gateway);

        let err = deleted(&state, &cancelled_subscription()).await.unwrap_err();
        assert!(matches!(err, ReconcileError::SubscriptionNotFound { ref subscription_id } if subscription_id == "sub_1"));
    }

    #[tokio::test]
    async fn missing_ended_at_falls_back_to_now() {
        let gateway = Arc::new(InMemoryGateway::new());
        gateway.seed(
            SUBSCRIPTIONS_COLLECTION,
            json!({"id": "s-1", "user": "u-1", "status": "active", "stripe_subscription_id": "sub_1"}),
        );
        let state = test_state(gateway.clone());

        let mut sub = cancelled_subscription();
        sub.ended_at = None;

        deleted(&state, &sub).await.unwrap();

        let rows = gateway.records(SUBSCRIPTIONS_COLLECTION);
        let year = rows[0]["end_date"].as_str().unwrap()[..4].parse::<i32>().unwrap();
        assert!(year >= 2024);
    }
}

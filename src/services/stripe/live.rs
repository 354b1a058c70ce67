use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::verify::{VerifyError, WebhookVerifier};
use super::{ProviderInvoice, ProviderSubscription, StripeService, StripeServiceError};
use crate::config::StripeSettings;
use crate::models::event::WebhookEvent;

const API_BASE: &str = "https://api.stripe.com/v1";

/// Live provider client: signature verification plus the two reference
/// reads, straight against the Stripe REST API with bearer auth.
pub struct LiveStripeService {
    client: Client,
    secret_key: String,
    verifier: WebhookVerifier,
}

impl LiveStripeService {
    pub fn new(client: Client, settings: &StripeSettings) -> Self {
        LiveStripeService {
            client,
            secret_key: settings.secret_key.clone(),
            verifier: WebhookVerifier::new(&settings.webhook_secret, settings.tolerance_seconds),
        }
    }

    async fn get_json(&self, path: &str) -> Result<Value, StripeServiceError> {
        let response = self
            .client
            .get(format!("{}{}", API_BASE, path))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| StripeServiceError::Api(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StripeServiceError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StripeServiceError::Api(format!("{}: {}", status, body)));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| StripeServiceError::Serde(e.to_string()))
    }
}

/// Expandable references arrive as a bare id string or an embedded object.
fn id_or_object(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj.get("id").and_then(|v| v.as_str()).map(|s| s.to_string()),
        _ => None,
    }
}

fn require_str(value: &Value, field: &str) -> Result<String, StripeServiceError> {
    value
        .get(field)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| StripeServiceError::Serde(format!("response missing {}", field)))
}

#[async_trait]
impl StripeService for LiveStripeService {
    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<WebhookEvent, VerifyError> {
        self.verifier.verify(payload, signature_header)
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ProviderSubscription, StripeServiceError> {
        let body = self
            .get_json(&format!("/subscriptions/{}", subscription_id))
            .await?;

        let price = &body["items"]["data"][0]["price"];
        Ok(ProviderSubscription {
            id: require_str(&body, "id")?,
            status: require_str(&body, "status")?,
            current_period_start: body.get("current_period_start").and_then(|v| v.as_i64()),
            current_period_end: body.get("current_period_end").and_then(|v| v.as_i64()),
            cancel_at_period_end: body
                .get("cancel_at_period_end")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            latest_invoice: body.get("latest_invoice").and_then(id_or_object),
            price_id: price.get("id").and_then(|v| v.as_str()).map(String::from),
            product_id: price.get("product").and_then(id_or_object),
        })
    }

    async fn retrieve_invoice(
        &self,
        invoice_id: &str,
    ) -> Result<ProviderInvoice, StripeServiceError> {
        let body = self.get_json(&format!("/invoices/{}", invoice_id)).await?;

        Ok(ProviderInvoice {
            id: require_str(&body, "id")?,
            payment_intent: body.get("payment_intent").and_then(id_or_object),
            amount_paid: body.get("amount_paid").and_then(|v| v.as_i64()).unwrap_or(0),
            currency: body.get("currency").and_then(|v| v.as_str()).map(String::from),
            subscription: body.get("subscription").and_then(id_or_object),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn id_or_object_handles_both_reference_shapes() {
        assert_eq!(id_or_object(&json!("in_123")).as_deref(), Some("in_123"));
        assert_eq!(
            id_or_object(&json!({"id": "in_456", "amount_paid": 1999})).as_deref(),
            Some("in_456")
        );
        assert_eq!(id_or_object(&json!(null)), None);
    }

    #[test]
    fn verify_webhook_rejects_an_invalid_signature() {
        let service = LiveStripeService::new(
            Client::new(),
            &StripeSettings {
                secret_key: "sk_test_dummy".into(),
                webhook_secret: "whsec_test".into(),
                tolerance_seconds: 300,
            },
        );
        let payload = br#"{ "id": "evt_1", "type": "checkout.session.completed" }"#;

        let result = service.verify_webhook(payload, "t=1,v1=00ff");
        assert!(result.is_err());
    }
}

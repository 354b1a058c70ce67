use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::verify::VerifyError;
use super::{ProviderInvoice, ProviderSubscription, StripeService, StripeServiceError};
use crate::models::event::WebhookEvent;

/// Recording mock for tests: serves canned subscriptions/invoices and
/// accepts any signature so payloads can be delivered directly.
#[derive(Clone, Default)]
pub struct MockStripeService {
    pub subscriptions: Arc<Mutex<HashMap<String, ProviderSubscription>>>,
    pub invoices: Arc<Mutex<HashMap<String, ProviderInvoice>>>,
    pub verified_event_ids: Arc<Mutex<Vec<String>>>,
    pub subscription_reads: Arc<Mutex<usize>>,
    pub invoice_reads: Arc<Mutex<usize>>,
}

impl MockStripeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscription(self, subscription: ProviderSubscription) -> Self {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription.id.clone(), subscription);
        self
    }

    pub fn with_invoice(self, invoice: ProviderInvoice) -> Self {
        self.invoices
            .lock()
            .unwrap()
            .insert(invoice.id.clone(), invoice);
        self
    }
}

#[async_trait]
impl StripeService for MockStripeService {
    fn verify_webhook(
        &self,
        payload: &[u8],
        _signature_header: &str,
    ) -> Result<WebhookEvent, VerifyError> {
        let raw: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| VerifyError::MalformedPayload(e.to_string()))?;
        let event = WebhookEvent::from_json(raw)
            .map_err(|e| VerifyError::MalformedPayload(e.to_string()))?;
        self.verified_event_ids.lock().unwrap().push(event.id.clone());
        Ok(event)
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ProviderSubscription, StripeServiceError> {
        *self.subscription_reads.lock().unwrap() += 1;
        self.subscriptions
            .lock()
            .unwrap()
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| {
                StripeServiceError::NotFound(format!("subscription {}", subscription_id))
            })
    }

    async fn retrieve_invoice(
        &self,
        invoice_id: &str,
    ) -> Result<ProviderInvoice, StripeServiceError> {
        *self.invoice_reads.lock().unwrap() += 1;
        self.invoices
            .lock()
            .unwrap()
            .get(invoice_id)
            .cloned()
            .ok_or_else(|| StripeServiceError::NotFound(format!("invoice {}", invoice_id)))
    }
}

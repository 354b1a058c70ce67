use serde_json::{json, Value};
use std::sync::Arc;
use time::OffsetDateTime;

use crate::models::event::WebhookEvent;
use crate::models::event_log::EventStatus;
use crate::records::{record_id, GatewayError, RecordGateway, RecordQuery};
use crate::utils::rfc3339;

pub const EVENT_LOG_COLLECTION: &str = "webhook_events";

/// What the caller should do with a delivery after journaling it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// First sight of this event id; run the handlers.
    Fresh,
    /// Seen before but not completed (concurrent redelivery or a prior
    /// failure); run the handlers again — they are idempotent by natural key.
    Replay,
    /// Already reconciled; skip the handlers and acknowledge.
    AlreadyCompleted,
}

/// Append/update audit log over the record store, keyed by provider event
/// id. Entries are never deleted; a failed entry is the sole trail for
/// manual remediation.
pub struct EventLedger {
    records: Arc<dyn RecordGateway>,
}

impl EventLedger {
    pub fn new(records: Arc<dyn RecordGateway>) -> Self {
        EventLedger { records }
    }

    fn by_event_id(event_id: &str) -> Value {
        json!({ "event_id": { "_eq": event_id } })
    }

    pub async fn record_received(
        &self,
        event: &WebhookEvent,
    ) -> Result<Disposition, GatewayError> {
        let query = RecordQuery::filtered(Self::by_event_id(&event.id)).with_limit(1);
        let existing = self
            .records
            .read_by_query(EVENT_LOG_COLLECTION, &query)
            .await?;

        if let Some(entry) = existing.first() {
            let status = entry
                .get("status")
                .and_then(|v| v.as_str())
                .and_then(EventStatus::parse);
            if status == Some(EventStatus::Completed) {
                return Ok(Disposition::AlreadyCompleted);
            }
            if let Some(entry_id) = record_id(entry) {
                self.records
                    .update_one(
                        EVENT_LOG_COLLECTION,
                        &entry_id,
                        json!({
                            "status": EventStatus::Processing.as_str(),
                            "payload": event.raw,
                            "error": Value::Null,
                        }),
                    )
                    .await?;
            }
            return Ok(Disposition::Replay);
        }

        self.records
            .create_one(
                EVENT_LOG_COLLECTION,
                json!({
                    "event_id": event.id,
                    "event_type": event.kind.name(),
                    "status": EventStatus::Processing.as_str(),
                    "payload": event.raw,
                    "received_at": rfc3339(event.received_at),
                }),
            )
            .await?;
        Ok(Disposition::Fresh)
    }

    pub async fn mark_completed(&self, event_id: &str) -> Result<(), GatewayError> {
        self.records
            .update_by_query(
                EVENT_LOG_COLLECTION,
                &Self::by_event_id(event_id),
                json!({
                    "status": EventStatus::Completed.as_str(),
                    "processed_at": rfc3339(OffsetDateTime::now_utc()),
                }),
            )
            .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, event_id: &str, error: &str) -> Result<(), GatewayError> {
        self.records
            .update_by_query(
                EVENT_LOG_COLLECTION,
                &Self::by_event_id(event_id),
                json!({
                    "status": EventStatus::Failed.as_str(),
                    "error": error,
                    "processed_at": rfc3339(OffsetDateTime::now_utc()),
                }),
            )
            .await?;
        Ok(())
    }
}

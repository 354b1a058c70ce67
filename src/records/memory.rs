use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::{record_id, GatewayError, RecordGateway, RecordQuery};

/// In-memory gateway mirroring the live filter semantics. Used by tests;
/// exposes its collections plus call counters for assertions.
#[derive(Clone, Default)]
pub struct InMemoryGateway {
    collections: Arc<Mutex<HashMap<String, Vec<Value>>>>,
    pub creates: Arc<Mutex<usize>>,
    pub updates: Arc<Mutex<usize>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a record as-is; callers provide the id.
    pub fn seed(&self, collection: &str, record: Value) {
        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push(record);
    }

    pub fn records(&self, collection: &str) -> Vec<Value> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

fn matches(filter: &Value, record: &Value) -> bool {
    let Some(conditions) = filter.as_object() else {
        return true;
    };
    conditions.iter().all(|(key, condition)| match key.as_str() {
        "_and" => condition
            .as_array()
            .map(|parts| parts.iter().all(|part| matches(part, record)))
            .unwrap_or(false),
        field => match condition {
            Value::Object(ops) => ops.iter().all(|(op, expected)| {
                let actual = record.get(field);
                match op.as_str() {
                    "_eq" => actual == Some(expected),
                    "_neq" => actual != Some(expected),
                    "_in" => expected
                        .as_array()
                        .map(|allowed| actual.map(|a| allowed.contains(a)).unwrap_or(false))
                        .unwrap_or(false),
                    _ => false,
                }
            }),
            expected => record.get(field) == Some(expected),
        },
    })
}

fn merge(record: &mut Value, fields: &Value) {
    if let (Some(target), Some(updates)) = (record.as_object_mut(), fields.as_object()) {
        for (key, value) in updates {
            target.insert(key.clone(), value.clone());
        }
    }
}

#[async_trait]
impl RecordGateway for InMemoryGateway {
    async fn create_one(&self, collection: &str, mut fields: Value) -> Result<String, GatewayError> {
        *self.creates.lock().unwrap() += 1;
        let id = record_id(&fields).unwrap_or_else(|| Uuid::new_v4().to_string());
        if let Some(map) = fields.as_object_mut() {
            map.insert("id".into(), Value::String(id.clone()));
        }
        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push(fields);
        Ok(id)
    }

    async fn read_by_query(
        &self,
        collection: &str,
        query: &RecordQuery,
    ) -> Result<Vec<Value>, GatewayError> {
        let guard = self.collections.lock().unwrap();
        let mut found: Vec<Value> = guard
            .get(collection)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| matches(&query.filter, r))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if let Some(limit) = query.limit {
            found.truncate(limit as usize);
        }
        Ok(found)
    }

    async fn update_one(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> Result<(), GatewayError> {
        *self.updates.lock().unwrap() += 1;
        let mut guard = self.collections.lock().unwrap();
        let records = guard.entry(collection.to_string()).or_default();
        let record = records
            .iter_mut()
            .find(|r| record_id(r).as_deref() == Some(id))
            .ok_or_else(|| GatewayError::Api {
                status: 404,
                message: format!("{}/{} not found", collection, id),
            })?;
        merge(record, &fields);
        Ok(())
    }

    async fn update_by_query(
        &self,
        collection: &str,
        filter: &Value,
        fields: Value,
    ) -> Result<u64, GatewayError> {
        *self.updates.lock().unwrap() += 1;
        let mut guard = self.collections.lock().unwrap();
        let mut count = 0;
        if let Some(records) = guard.get_mut(collection) {
            for record in records.iter_mut().filter(|r| matches(filter, r)) {
                merge(record, &fields);
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn eq_filter_matches_only_equal_values() {
        let gateway = InMemoryGateway::new();
        gateway.seed("payments", json!({"id": "1", "stripe_payment_id": "pi_a"}));
        gateway.seed("payments", json!({"id": "2", "stripe_payment_id": "pi_b"}));

        let found = gateway
            .read_by_query(
                "payments",
                &RecordQuery::filtered(json!({"stripe_payment_id": {"_eq": "pi_b"}})),
            )
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(record_id(&found[0]).as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn and_with_in_filter_matches_status_set() {
        let gateway = InMemoryGateway::new();
        gateway.seed("subscriptions", json!({"id": "1", "user": "u-1", "status": "active"}));
        gateway.seed("subscriptions", json!({"id": "2", "user": "u-1", "status": "cancelled"}));
        gateway.seed("subscriptions", json!({"id": "3", "user": "u-2", "status": "passive"}));

        let filter = json!({"_and": [
            {"user": {"_eq": "u-1"}},
            {"status": {"_in": ["active", "passive"]}}
        ]});
        let found = gateway
            .read_by_query("subscriptions", &RecordQuery::filtered(filter))
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(record_id(&found[0]).as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn create_assigns_an_id_and_update_merges() {
        let gateway = InMemoryGateway::new();
        let id = gateway
            .create_one("packages", json!({"stripe_price_id": "price_1"}))
            .await
            .unwrap();

        gateway
            .update_one("packages", &id, json!({"stripe_product_id": "prod_1"}))
            .await
            .unwrap();

        let records = gateway.records("packages");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["stripe_price_id"], "price_1");
        assert_eq!(records[0]["stripe_product_id"], "prod_1");
    }

    #[tokio::test]
    async fn update_by_query_reports_match_count() {
        let gateway = InMemoryGateway::new();
        gateway.seed("subscriptions", json!({"id": "1", "stripe_subscription_id": "sub_1"}));

        let hit = gateway
            .update_by_query(
                "subscriptions",
                &json!({"stripe_subscription_id": {"_eq": "sub_1"}}),
                json!({"status": "cancelled"}),
            )
            .await
            .unwrap();
        let miss = gateway
            .update_by_query(
                "subscriptions",
                &json!({"stripe_subscription_id": {"_eq": "sub_2"}}),
                json!({"status": "cancelled"}),
            )
            .await
            .unwrap();

        assert_eq!(hit, 1);
        assert_eq!(miss, 0);
        assert_eq!(gateway.records("subscriptions")[0]["status"], "cancelled");
    }
}

use async_trait::async_trait;
use serde_json::Value;

mod directus;
mod memory;

pub use directus::DirectusGateway;
pub use memory::InMemoryGateway;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Http(String),
    #[error("gateway returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("unexpected gateway response: {0}")]
    Decode(String),
}

/// Filtered read against a named collection. `filter` uses the Directus
/// operator syntax (`{"field": {"_eq": v}}`, `_in`, `_and`).
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    pub filter: Value,
    pub limit: Option<u32>,
    pub fields: Vec<String>,
}

impl RecordQuery {
    pub fn filtered(filter: Value) -> Self {
        RecordQuery {
            filter,
            limit: None,
            fields: Vec::new(),
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Generic access to the record store. The engine never issues raw storage
/// queries; every read and write goes through this interface, and the
/// store's uniqueness constraints are the final arbiter under concurrent
/// redelivery.
#[async_trait]
pub trait RecordGateway: Send + Sync {
    async fn create_one(&self, collection: &str, fields: Value) -> Result<String, GatewayError>;

    async fn read_by_query(
        &self,
        collection: &str,
        query: &RecordQuery,
    ) -> Result<Vec<Value>, GatewayError>;

    async fn update_one(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> Result<(), GatewayError>;

    async fn update_by_query(
        &self,
        collection: &str,
        filter: &Value,
        fields: Value,
    ) -> Result<u64, GatewayError>;
}

/// Primary keys come back as strings or numbers depending on the collection.
pub fn record_id(record: &Value) -> Option<String> {
    match record.get("id") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_id_handles_string_and_numeric_keys() {
        assert_eq!(record_id(&json!({"id": "abc"})).as_deref(), Some("abc"));
        assert_eq!(record_id(&json!({"id": 42})).as_deref(), Some("42"));
        assert_eq!(record_id(&json!({"name": "x"})), None);
    }
}

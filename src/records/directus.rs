use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{record_id, GatewayError, RecordGateway, RecordQuery};
use crate::config::DirectusSettings;

/// Live gateway over the Directus items REST API. All four operations map
/// onto `/items/{collection}`; the engine holds a static access token.
pub struct DirectusGateway {
    client: Client,
    base_url: String,
    access_token: String,
}

impl DirectusGateway {
    pub fn new(client: Client, settings: &DirectusSettings) -> Self {
        DirectusGateway {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            access_token: settings.access_token.clone(),
        }
    }

    fn items_url(&self, collection: &str) -> String {
        format!("{}/items/{}", self.base_url, collection)
    }

    async fn read_body(response: reqwest::Response) -> Result<Value, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

#[async_trait]
impl RecordGateway for DirectusGateway {
    async fn create_one(&self, collection: &str, fields: Value) -> Result<String, GatewayError> {
        let response = self
            .client
            .post(self.items_url(collection))
            .bearer_auth(&self.access_token)
            .json(&fields)
            .send()
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        let body = Self::read_body(response).await?;
        body.get("data")
            .and_then(record_id)
            .ok_or_else(|| GatewayError::Decode("create response carried no record id".into()))
    }

    async fn read_by_query(
        &self,
        collection: &str,
        query: &RecordQuery,
    ) -> Result<Vec<Value>, GatewayError> {
        let mut url = format!(
            "{}?filter={}",
            self.items_url(collection),
            urlencoding::encode(&query.filter.to_string())
        );
        if let Some(limit) = query.limit {
            url.push_str(&format!("&limit={}", limit));
        }
        if !query.fields.is_empty() {
            url.push_str(&format!("&fields={}", query.fields.join(",")));
        }

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        let body = Self::read_body(response).await?;
        match body.get("data") {
            Some(Value::Array(items)) => Ok(items.clone()),
            _ => Err(GatewayError::Decode("read response carried no data array".into())),
        }
    }

    async fn update_one(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> Result<(), GatewayError> {
        let response = self
            .client
            .patch(format!("{}/{}", self.items_url(collection), id))
            .bearer_auth(&self.access_token)
            .json(&fields)
            .send()
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        Self::read_body(response).await?;
        Ok(())
    }

    async fn update_by_query(
        &self,
        collection: &str,
        filter: &Value,
        fields: Value,
    ) -> Result<u64, GatewayError> {
        let payload = json!({
            "query": { "filter": filter },
            "data": fields,
        });

        let response = self
            .client
            .patch(self.items_url(collection))
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        let body = Self::read_body(response).await?;
        match body.get("data") {
            Some(Value::Array(items)) => Ok(items.len() as u64),
            // Older Directus versions return the updated keys directly.
            Some(_) => Ok(1),
            None => Ok(0),
        }
    }
}

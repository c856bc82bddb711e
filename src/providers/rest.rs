//! Backend-as-a-service provider speaking the PostgREST dialect over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;

use super::adapter::{
    Fields, ProviderAdapter, Record, RecordFilter, RecordId, not_found, strip_id,
};
use super::{Collection, ProviderKind};
use crate::error::StoreError;

const BODY_SNIPPET_CHARS: usize = 200;

pub struct RestAdapter {
    client: Client,
    base_url: String,
    service_key: String,
}

impl RestAdapter {
    pub fn new(service_url: &str, service_key: &str, connect_timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(concat!("fintrack/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StoreError::storage(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: service_url.trim().trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
        })
    }

    fn table_url(&self, collection: Collection) -> String {
        format!("{}/rest/v1/{}", self.base_url, collection.as_str())
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    /// Sends the request and decodes a PostgREST row array.
    async fn rows(&self, request: RequestBuilder) -> Result<Vec<Fields>, StoreError> {
        let response = self.authorized(request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, &body));
        }

        match response.json::<Value>().await? {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(fields) => Ok(fields),
                    other => Err(StoreError::storage(format!(
                        "expected a row object, got {other}"
                    ))),
                })
                .collect(),
            Value::Object(fields) => Ok(vec![fields]),
            other => Err(StoreError::storage(format!(
                "unexpected response shape: {other}"
            ))),
        }
    }

    async fn single(
        &self,
        collection: Collection,
        id: &RecordId,
        request: RequestBuilder,
    ) -> Result<Record, StoreError> {
        self.rows(request)
            .await?
            .into_iter()
            .next()
            .map(Record::from_row)
            .transpose()?
            .ok_or_else(|| not_found(collection, id))
    }
}

fn eq_filter(value: &Value) -> String {
    match value {
        Value::Null => "is.null".to_string(),
        Value::String(s) => format!("eq.{s}"),
        other => format!("eq.{other}"),
    }
}

fn id_filter(id: &RecordId) -> (&'static str, String) {
    ("id", format!("eq.{id}"))
}

fn map_status(status: StatusCode, body: &str) -> StoreError {
    let snippet: String = body.chars().take(BODY_SNIPPET_CHARS).collect();
    let message = format!("HTTP {}: {}", status.as_u16(), snippet);

    match status {
        StatusCode::CONFLICT => StoreError::Conflict(message),
        StatusCode::NOT_FOUND => StoreError::NotFound(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            StoreError::Unavailable(message)
        }
        s if s.is_server_error() => StoreError::Unavailable(message),
        _ => StoreError::Storage(message),
    }
}

#[async_trait]
impl ProviderAdapter for RestAdapter {
    fn kind(&self) -> Option<ProviderKind> {
        Some(ProviderKind::BackendAsAService)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let response = self
            .authorized(self.client.get(format!("{}/rest/v1/", self.base_url)))
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(map_status(status, &body))
        }
    }

    async fn list(
        &self,
        collection: Collection,
        filter: &RecordFilter,
    ) -> Result<Vec<Record>, StoreError> {
        let mut query: Vec<(String, String)> = vec![
            ("select".to_string(), "*".to_string()),
            ("order".to_string(), "id.asc".to_string()),
        ];
        for (field, value) in &filter.equals {
            query.push((field.clone(), eq_filter(value)));
        }
        if let Some(limit) = filter.limit {
            query.push(("limit".to_string(), limit.to_string()));
        }
        if filter.offset > 0 {
            query.push(("offset".to_string(), filter.offset.to_string()));
        }

        self.rows(self.client.get(self.table_url(collection)).query(&query))
            .await?
            .into_iter()
            .map(Record::from_row)
            .collect()
    }

    async fn get(&self, collection: Collection, id: &RecordId) -> Result<Record, StoreError> {
        let request = self
            .client
            .get(self.table_url(collection))
            .query(&[("select", "*".to_string()), id_filter(id)]);
        self.single(collection, id, request).await
    }

    async fn insert(&self, collection: Collection, fields: Fields) -> Result<Record, StoreError> {
        let request = self
            .client
            .post(self.table_url(collection))
            .header("Prefer", "return=representation")
            .json(&strip_id(fields));

        self.rows(request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::storage("insert returned no representation"))
            .and_then(Record::from_row)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &RecordId,
        partial: Fields,
    ) -> Result<Record, StoreError> {
        let request = self
            .client
            .patch(self.table_url(collection))
            .query(&[id_filter(id)])
            .header("Prefer", "return=representation")
            .json(&strip_id(partial));
        self.single(collection, id, request).await
    }

    async fn delete(&self, collection: Collection, id: &RecordId) -> Result<(), StoreError> {
        let request = self
            .client
            .delete(self.table_url(collection))
            .query(&[id_filter(id)])
            .header("Prefer", "return=representation");
        self.single(collection, id, request).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            map_status(StatusCode::CONFLICT, "duplicate key"),
            StoreError::Conflict(m) if m.contains("duplicate key")
        ));
        assert!(matches!(
            map_status(StatusCode::BAD_GATEWAY, ""),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            map_status(StatusCode::UNAUTHORIZED, "bad key"),
            StoreError::Storage(_)
        ));
    }

    #[test]
    fn test_status_body_is_truncated() {
        let body = "é".repeat(500);
        let StoreError::Storage(message) = map_status(StatusCode::BAD_REQUEST, &body) else {
            panic!("expected storage error");
        };
        assert_eq!(message.chars().filter(|c| *c == 'é').count(), BODY_SNIPPET_CHARS);
    }

    #[test]
    fn test_eq_filter_formatting() {
        assert_eq!(eq_filter(&json!("abc")), "eq.abc");
        assert_eq!(eq_filter(&json!(5)), "eq.5");
        assert_eq!(eq_filter(&json!(true)), "eq.true");
        assert_eq!(eq_filter(&Value::Null), "is.null");
    }
}

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::normalize::{KeyStyle, RawRecord};
use crate::store::{into_records, EntityKind, RecordStore, StoreError};

/// json-server style REST API: `GET/POST /{collection}`, `PUT/DELETE /{collection}/{id}`.
pub struct RestStore {
    client: Client,
    base_url: String,
}

impl RestStore {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, kind: EntityKind) -> String {
        format!("{}/{}", self.base_url, kind.collection())
    }

    /// Resolves a business key to the server's row id.
    async fn row_id(&self, kind: EntityKind, key: &str) -> anyhow::Result<String> {
        let body: Value = self
            .client
            .get(self.url(kind))
            .query(&[(kind.key_field(), key)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let found = into_records(kind, body)?
            .into_iter()
            .next()
            .and_then(|record| match record.get("id") {
                Some(Value::String(id)) => Some(id.clone()),
                Some(Value::Number(id)) => Some(id.to_string()),
                _ => None,
            });

        found.ok_or_else(|| {
            StoreError::NotFound {
                kind,
                key: key.to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl RecordStore for RestStore {
    async fn fetch_all(&self, kind: EntityKind) -> anyhow::Result<Vec<RawRecord>> {
        let body: Value = self
            .client
            .get(self.url(kind))
            .send()
            .await
            .with_context(|| format!("failed to reach {}", self.base_url))?
            .error_for_status()?
            .json()
            .await?;

        let records = into_records(kind, body)?;
        debug!(%kind, count = records.len(), "fetched records");
        Ok(records)
    }

    async fn insert(&self, kind: EntityKind, mut record: RawRecord) -> anyhow::Result<()> {
        record
            .entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));

        self.client
            .post(self.url(kind))
            .json(&record)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn update(&self, kind: EntityKind, key: &str, mut record: RawRecord) -> anyhow::Result<()> {
        let id = self.row_id(kind, key).await?;
        record.insert("id".to_string(), Value::String(id.clone()));

        self.client
            .put(format!("{}/{id}", self.url(kind)))
            .json(&record)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn delete(&self, kind: EntityKind, key: &str) -> anyhow::Result<()> {
        let id = self.row_id(kind, key).await?;

        self.client
            .delete(format!("{}/{id}", self.url(kind)))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    fn key_style(&self) -> KeyStyle {
        KeyStyle::Camel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetches_collections() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/students"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "1", "studentId": "S001", "firstName": "Avery", "lastName": "Lee"}
            ])))
            .mount(&server)
            .await;

        let store = RestStore::new(&server.uri()).unwrap();
        let records = store.fetch_all(EntityKind::Students).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["studentId"], "S001");
    }

    #[tokio::test]
    async fn server_errors_propagate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/exams"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = RestStore::new(&server.uri()).unwrap();
        assert!(store.fetch_all(EntityKind::Exams).await.is_err());
    }

    #[tokio::test]
    async fn insert_assigns_a_row_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/courses"))
            .and(body_partial_json(json!({"courseId": "C001"})))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let store = RestStore::new(&server.uri()).unwrap();
        let record = json!({"courseId": "C001", "courseCode": "CS101", "courseName": "Intro"});
        store
            .insert(EntityKind::Courses, record.as_object().cloned().unwrap())
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body["id"].is_string());
    }

    #[tokio::test]
    async fn delete_resolves_business_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/students"))
            .and(query_param("studentId", "S002"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "1700000000000", "studentId": "S002"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/students/1700000000000"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let store = RestStore::new(&server.uri()).unwrap();
        store.delete(EntityKind::Students, "S002").await.unwrap();
    }

    #[tokio::test]
    async fn update_of_missing_key_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/students"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let store = RestStore::new(&server.uri()).unwrap();
        let err = store
            .update(EntityKind::Students, "S404", RawRecord::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::NotFound { .. })
        ));
    }
}

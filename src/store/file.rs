use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::normalize::{self, KeyStyle, RawRecord};
use crate::store::{into_records, EntityKind, RecordStore, StoreError};

/// A json-server `db.json` document: one top-level array per collection.
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_document(&self) -> anyhow::Result<Map<String, Value>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", self.path.display()))
            }
        };

        match serde_json::from_slice::<Value>(&bytes)
            .with_context(|| format!("{} is not valid JSON", self.path.display()))?
        {
            Value::Object(document) => Ok(document),
            _ => anyhow::bail!("{} must contain a JSON object", self.path.display()),
        }
    }

    async fn write_document(&self, document: Map<String, Value>) -> anyhow::Result<()> {
        let body = serde_json::to_vec_pretty(&Value::Object(document))?;
        tokio::fs::write(&self.path, body)
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))
    }

    fn collection(document: &Map<String, Value>, kind: EntityKind) -> anyhow::Result<Vec<RawRecord>> {
        match document.get(kind.collection()) {
            Some(value) => into_records(kind, value.clone()),
            None => Ok(Vec::new()),
        }
    }

    fn position(records: &[RawRecord], kind: EntityKind, key: &str) -> Result<usize, StoreError> {
        records
            .iter()
            .position(|record| normalize::text(record, kind.key_field()).as_deref() == Some(key))
            .ok_or_else(|| StoreError::NotFound {
                kind,
                key: key.to_string(),
            })
    }

    async fn modify(
        &self,
        kind: EntityKind,
        change: impl FnOnce(&mut Vec<RawRecord>) -> anyhow::Result<()> + Send,
    ) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document().await?;
        let mut records = Self::collection(&document, kind)?;

        change(&mut records)?;

        document.insert(
            kind.collection().to_string(),
            Value::Array(records.into_iter().map(Value::Object).collect()),
        );
        self.write_document(document).await
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn fetch_all(&self, kind: EntityKind) -> anyhow::Result<Vec<RawRecord>> {
        let document = self.read_document().await?;
        let records = Self::collection(&document, kind)?;
        debug!(%kind, count = records.len(), path = %self.path.display(), "read records");
        Ok(records)
    }

    async fn insert(&self, kind: EntityKind, mut record: RawRecord) -> anyhow::Result<()> {
        record
            .entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        self.modify(kind, move |records| {
            records.push(record);
            Ok(())
        })
        .await
    }

    async fn update(&self, kind: EntityKind, key: &str, record: RawRecord) -> anyhow::Result<()> {
        let key = key.to_string();
        self.modify(kind, move |records| {
            let index = Self::position(records, kind, &key)?;
            records[index].extend(record);
            Ok(())
        })
        .await
    }

    async fn delete(&self, kind: EntityKind, key: &str) -> anyhow::Result<()> {
        let key = key.to_string();
        self.modify(kind, move |records| {
            let index = Self::position(records, kind, &key)?;
            records.remove(index);
            Ok(())
        })
        .await
    }

    fn key_style(&self) -> KeyStyle {
        KeyStyle::Camel
    }
}

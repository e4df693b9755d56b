use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::normalize::{KeyStyle, RawRecord};
use crate::store::{EntityKind, RecordStore, StoreError};

const SCHEMA: &str = "student_records";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("failed to connect to Postgres")?;
        Ok(Self { pool })
    }

    pub async fn init_db(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn qualified(kind: EntityKind) -> String {
    format!("{SCHEMA}.{}", kind.table())
}

/// Column names come from our own serialized structs; quoting keeps them literal.
fn column_list(record: &RawRecord) -> anyhow::Result<Vec<String>> {
    record
        .keys()
        .map(|key| {
            if key.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
                Ok(format!("\"{key}\""))
            } else {
                anyhow::bail!("invalid column name {key:?}")
            }
        })
        .collect()
}

#[async_trait]
impl RecordStore for PgStore {
    async fn fetch_all(&self, kind: EntityKind) -> anyhow::Result<Vec<RawRecord>> {
        let query = format!(
            "SELECT row_to_json(t)::jsonb AS record FROM {} t ORDER BY t.id",
            qualified(kind)
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            match row.try_get::<Value, _>("record")? {
                Value::Object(map) => records.push(map),
                _ => return Err(StoreError::UnexpectedShape { kind }.into()),
            }
        }

        debug!(%kind, count = records.len(), "fetched rows");
        Ok(records)
    }

    async fn insert(&self, kind: EntityKind, record: RawRecord) -> anyhow::Result<()> {
        let columns = column_list(&record)?.join(", ");
        let table = qualified(kind);
        let query = format!(
            "INSERT INTO {table} ({columns}) \
             SELECT {columns} FROM jsonb_populate_record(NULL::{table}, $1)"
        );

        sqlx::query(&query)
            .bind(Value::Object(record))
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to insert into {table}"))?;
        Ok(())
    }

    async fn update(&self, kind: EntityKind, key: &str, record: RawRecord) -> anyhow::Result<()> {
        let assignments = column_list(&record)?
            .iter()
            .map(|column| format!("{column} = r.{column}"))
            .collect::<Vec<_>>()
            .join(", ");
        let table = qualified(kind);
        let query = format!(
            "UPDATE {table} AS t SET {assignments} \
             FROM jsonb_populate_record(NULL::{table}, $1) AS r \
             WHERE t.{} = $2",
            kind.key_column()
        );

        let result = sqlx::query(&query)
            .bind(Value::Object(record))
            .bind(key)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                kind,
                key: key.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn delete(&self, kind: EntityKind, key: &str) -> anyhow::Result<()> {
        let query = format!(
            "DELETE FROM {} WHERE {} = $1",
            qualified(kind),
            kind.key_column()
        );
        let result = sqlx::query(&query).bind(key).execute(&self.pool).await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                kind,
                key: key.to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn key_style(&self) -> KeyStyle {
        KeyStyle::Snake
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn columns_are_quoted_snake_case() {
        let record = json!({"student_id": "S1", "first_name": "Avery"});
        let mut columns = column_list(record.as_object().unwrap()).unwrap();
        columns.sort();
        assert_eq!(columns, ["\"first_name\"", "\"student_id\""]);
    }

    #[test]
    fn unexpected_column_names_are_refused() {
        let record = json!({"name\"; DROP TABLE student; --": "x"});
        assert!(column_list(record.as_object().unwrap()).is_err());
    }

    #[test]
    fn tables_live_in_the_schema() {
        assert_eq!(qualified(EntityKind::Results), "student_records.exam_results");
    }
}

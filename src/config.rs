use std::path::PathBuf;

use anyhow::Context;
use clap::ValueEnum;

use crate::store::file::FileStore;
use crate::store::postgres::PgStore;
use crate::store::rest::RestStore;
use crate::store::RecordStore;

const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_DATA_FILE: &str = "db.json";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    Postgres,
    Rest,
    File,
}

impl std::str::FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        <Backend as ValueEnum>::from_str(value, true)
            .map_err(|_| anyhow::anyhow!("STORE_BACKEND must be postgres, rest or file, got {value:?}"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub backend: Backend,
    pub database_url: Option<String>,
    pub api_base_url: String,
    pub data_file: PathBuf,
    pub max_connections: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let backend = match var("STORE_BACKEND") {
            Some(value) => value.parse()?,
            None => Backend::File,
        };
        let max_connections = match var("DB_MAX_CONNECTIONS") {
            Some(value) => value
                .trim()
                .parse()
                .with_context(|| format!("DB_MAX_CONNECTIONS must be a positive integer, got {value:?}"))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            backend,
            database_url: var("DATABASE_URL"),
            api_base_url: var("API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            data_file: var("DATA_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_FILE)),
            max_connections,
        })
    }

    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to a Postgres instance")
    }

    pub async fn connect_postgres(&self) -> anyhow::Result<PgStore> {
        PgStore::connect(self.database_url()?, self.max_connections).await
    }

    pub async fn open_store(&self) -> anyhow::Result<Box<dyn RecordStore>> {
        Ok(match self.backend {
            Backend::Postgres => Box::new(self.connect_postgres().await?),
            Backend::Rest => Box::new(RestStore::new(&self.api_base_url)?),
            Backend::File => Box::new(FileStore::new(self.data_file.clone())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_to_file_backend() {
        let config = config(&[]).unwrap();
        assert_eq!(config.backend, Backend::File);
        assert_eq!(config.api_base_url, "http://localhost:3000");
        assert_eq!(config.data_file, PathBuf::from("db.json"));
        assert_eq!(config.max_connections, 5);
        assert!(config.database_url().is_err());
    }

    #[test]
    fn reads_backend_case_insensitively() {
        let config = config(&[("STORE_BACKEND", "Postgres"), ("DATABASE_URL", "postgres://x")]).unwrap();
        assert_eq!(config.backend, Backend::Postgres);
        assert_eq!(config.database_url().unwrap(), "postgres://x");
    }

    #[test]
    fn rejects_unknown_backend_and_bad_pool_size() {
        assert!(config(&[("STORE_BACKEND", "mongo")]).is_err());
        assert!(config(&[("DB_MAX_CONNECTIONS", "many")]).is_err());
    }
}

//! Persisted account and user rows.
//!
//! The account row is the cached view of a tenant's gateway connection; the
//! user row backs login. Three backends implement the same traits: a
//! PostgREST-style HTTP store, PostgreSQL through sqlx, and an in-memory map.

pub mod memory;
pub mod postgres;
pub mod rest;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::{StoreBackend, StoreConfig};

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use rest::RestStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("could not decode store response: {0}")]
    Decode(String),

    #[error("invalid store configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StoreError::Decode(err.to_string())
        } else {
            StoreError::Unavailable(err.to_string())
        }
    }
}

/// Connection status persisted per tenant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connected" => Ok(ConnectionStatus::Connected),
            "disconnected" => Ok(ConnectionStatus::Disconnected),
            other => Err(format!("unknown connection status '{}'", other)),
        }
    }
}

/// Account connection record, one per tenant key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    #[serde(rename = "id", deserialize_with = "string_or_number")]
    pub tenant_key: String,

    #[serde(rename = "wa_instance_name", default, deserialize_with = "null_as_empty")]
    pub instance_name: String,

    #[serde(rename = "wa_conexion_status", default, deserialize_with = "lenient_status")]
    pub connection_status: ConnectionStatus,

    #[serde(rename = "wa_conexion_timestamp", default, deserialize_with = "lenient_timestamp")]
    pub connection_timestamp: Option<DateTime<Utc>>,

    /// Columns this service does not own, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AccountRecord {
    pub fn new(tenant_key: impl Into<String>, instance_name: impl Into<String>) -> Self {
        Self {
            tenant_key: tenant_key.into(),
            instance_name: instance_name.into(),
            connection_status: ConnectionStatus::Disconnected,
            connection_timestamp: None,
            extra: Map::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection_status == ConnectionStatus::Connected
    }

    fn apply(&mut self, patch: &AccountPatch) {
        if let Some(status) = patch.connection_status {
            self.connection_status = status;
        }
        if let Some(name) = &patch.instance_name {
            self.instance_name = name.clone();
        }
        if let Some(timestamp) = patch.connection_timestamp {
            self.connection_timestamp = timestamp;
        }
    }
}

/// Partial update of an account row; `None` fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccountPatch {
    #[serde(rename = "wa_conexion_status", skip_serializing_if = "Option::is_none")]
    pub connection_status: Option<ConnectionStatus>,

    #[serde(rename = "wa_instance_name", skip_serializing_if = "Option::is_none")]
    pub instance_name: Option<String>,

    /// `Some(None)` clears the timestamp
    #[serde(rename = "wa_conexion_timestamp", skip_serializing_if = "Option::is_none")]
    pub connection_timestamp: Option<Option<DateTime<Utc>>>,
}

impl AccountPatch {
    pub fn status(status: ConnectionStatus) -> Self {
        Self {
            connection_status: Some(status),
            ..Default::default()
        }
    }
}

/// Row of the users table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,

    pub username: String,

    /// Never serialized back out
    #[serde(default, skip_serializing, deserialize_with = "null_as_empty")]
    pub password: String,

    /// Tenant key of the user's account row
    #[serde(default, deserialize_with = "null_as_empty")]
    pub key: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_account(&self, tenant_key: &str) -> Result<Option<AccountRecord>, StoreError>;

    async fn insert_account(&self, record: &AccountRecord) -> Result<(), StoreError>;

    async fn patch_account(&self, tenant_key: &str, patch: &AccountPatch) -> Result<(), StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;

    /// Create the row if absent, else patch it.
    ///
    /// Stated here rather than left to backend defaults: a PATCH against a
    /// missing row succeeds silently on PostgREST without writing anything.
    async fn upsert_account(&self, tenant_key: &str, patch: &AccountPatch) -> Result<(), StoreError> {
        match self.find_account(tenant_key).await? {
            Some(_) => self.patch_account(tenant_key, patch).await,
            None => {
                let mut record = AccountRecord::new(tenant_key, "");
                record.apply(patch);
                self.insert_account(&record).await
            }
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn find_user(&self, id: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn touch_last_connection(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Both store handles, backed by the same backend instance
#[derive(Clone)]
pub struct Stores {
    pub accounts: Arc<dyn AccountStore>,
    pub users: Arc<dyn UserStore>,
}

impl Stores {
    pub fn from_backend<S>(store: Arc<S>) -> Self
    where
        S: AccountStore + UserStore + 'static,
    {
        Self {
            accounts: store.clone(),
            users: store,
        }
    }

    /// Build the configured backend
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        match config.backend {
            StoreBackend::Rest => Ok(Self::from_backend(Arc::new(RestStore::new(config)?))),
            StoreBackend::Postgres => {
                let store = PgStore::connect(config).await?;
                store.ensure_schema().await?;
                Ok(Self::from_backend(Arc::new(store)))
            }
            StoreBackend::Memory => {
                let store = match std::env::var("STORE_SEED_FILE") {
                    Ok(path) => MemoryStore::from_seed_file(&path)?,
                    Err(_) => MemoryStore::new(),
                };
                Ok(Self::from_backend(Arc::new(store)))
            }
        }
    }
}

/// Ids arrive as strings from some tables and as integers from others
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("expected string or number id, got {}", other))),
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Anything other than "connected" reads as disconnected
fn lenient_status<'de, D>(deserializer: D) -> Result<ConnectionStatus, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .and_then(|s| s.parse().ok())
        .unwrap_or(ConnectionStatus::Disconnected))
}

/// RFC 3339, or a naive `timestamp` column read as UTC; anything else is dropped
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let Some(raw) = raw.as_str() else {
        return Ok(None);
    };

    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(at.with_timezone(&Utc)));
    }
    Ok(["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc()))
}

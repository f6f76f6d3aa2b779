use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use tracing::info;

use super::{AccountPatch, AccountRecord, AccountStore, StoreError, UserRecord, UserStore};
use crate::config::StoreConfig;

/// PostgreSQL-backed store. Rows are read through `row_to_json` so extra
/// columns and integer ids come back the same way the REST backend sees them.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    accounts_table: String,
    users_table: String,
}

impl PgStore {
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let database_url = config
            .database_url
            .as_deref()
            .ok_or_else(|| StoreError::Config("DATABASE_URL is not set".to_string()))?;

        for table in [&config.accounts_table, &config.users_table] {
            if !Self::is_valid_table_name(table) {
                return Err(StoreError::Config(format!("invalid table name '{}'", table)));
            }
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(database_url)
            .await?;

        info!("Connected PostgreSQL store ({} / {})", config.accounts_table, config.users_table);
        Ok(Self::with_pool(pool, &config.accounts_table, &config.users_table))
    }

    pub fn with_pool(pool: PgPool, accounts_table: &str, users_table: &str) -> Self {
        Self {
            pool,
            accounts_table: Self::quote_identifier(accounts_table),
            users_table: Self::quote_identifier(users_table),
        }
    }

    /// Create both tables when missing (development databases)
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let accounts = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                wa_instance_name TEXT NOT NULL DEFAULT '',
                wa_conexion_status TEXT NOT NULL DEFAULT 'disconnected',
                wa_conexion_timestamp TIMESTAMPTZ
            )",
            self.accounts_table
        );
        let users = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                password TEXT NOT NULL,
                \"key\" TEXT NOT NULL,
                last_conexion TIMESTAMPTZ
            )",
            self.users_table
        );
        sqlx::query(&accounts).execute(&self.pool).await?;
        sqlx::query(&users).execute(&self.pool).await?;
        Ok(())
    }

    async fn select_one<T: DeserializeOwned>(&self, table: &str, column: &str, value: &str) -> Result<Option<T>, StoreError> {
        let sql = format!(
            "SELECT row_to_json(t) AS row FROM (SELECT * FROM {} WHERE {}::text = $1 LIMIT 1) t",
            table, column
        );

        let row = sqlx::query(&sql).bind(value).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => {
                let json: Value = row.try_get("row")?;
                serde_json::from_value(json)
                    .map(Some)
                    .map_err(|e| StoreError::Decode(e.to_string()))
            }
            None => Ok(None),
        }
    }

    fn quote_identifier(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Table names are interpolated into SQL, so only plain identifiers pass
    fn is_valid_table_name(name: &str) -> bool {
        !name.is_empty()
            && name.len() <= 63
            && !name.starts_with(|c: char| c.is_ascii_digit())
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn find_account(&self, tenant_key: &str) -> Result<Option<AccountRecord>, StoreError> {
        self.select_one(&self.accounts_table, "id", tenant_key).await
    }

    async fn insert_account(&self, record: &AccountRecord) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {} (id, wa_instance_name, wa_conexion_status, wa_conexion_timestamp) VALUES ($1, $2, $3, $4)",
            self.accounts_table
        );
        sqlx::query(&sql)
            .bind(&record.tenant_key)
            .bind(&record.instance_name)
            .bind(record.connection_status.as_str())
            .bind(record.connection_timestamp)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn patch_account(&self, tenant_key: &str, patch: &AccountPatch) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE {} SET
                wa_conexion_status = COALESCE($2, wa_conexion_status),
                wa_instance_name = COALESCE($3, wa_instance_name),
                wa_conexion_timestamp = CASE WHEN $4 THEN $5 ELSE wa_conexion_timestamp END
             WHERE id::text = $1",
            self.accounts_table
        );
        sqlx::query(&sql)
            .bind(tenant_key)
            .bind(patch.connection_status.map(|s| s.as_str()))
            .bind(patch.instance_name.as_deref())
            .bind(patch.connection_timestamp.is_some())
            .bind(patch.connection_timestamp.flatten())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        self.select_one(&self.users_table, "username", username).await
    }

    async fn find_user(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        self.select_one(&self.users_table, "id", id).await
    }

    async fn touch_last_connection(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let sql = format!("UPDATE {} SET last_conexion = $2 WHERE id::text = $1", self.users_table);
        sqlx::query(&sql).bind(id).bind(at).execute(&self.pool).await?;
        Ok(())
    }
}

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, error};
use url::Url;

use super::{AccountPatch, AccountRecord, AccountStore, StoreError, UserRecord, UserStore};
use crate::config::StoreConfig;

/// PostgREST-style store (Supabase `rest/v1`), filtered reads and minimal-return writes
#[derive(Clone)]
pub struct RestStore {
    base_url: Url,
    api_key: String,
    accounts_table: String,
    users_table: String,
    http: Client,
}

impl RestStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let mut base_url = Url::parse(&config.url)
            .map_err(|e| StoreError::Config(format!("invalid STORE_URL '{}': {}", config.url, e)))?;
        if let Ok(mut path) = base_url.path_segments_mut() {
            path.pop_if_empty().extend(["rest", "v1"]);
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StoreError::Config(e.to_string()))?;

        Ok(Self {
            base_url,
            api_key: config.api_key.clone(),
            accounts_table: config.accounts_table.clone(),
            users_table: config.users_table.clone(),
            http,
        })
    }

    fn table_url(&self, table: &str, filters: &[(&str, String)]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.push(table);
        }
        if !filters.is_empty() {
            let mut query = url.query_pairs_mut();
            for (column, value) in filters {
                query.append_pair(column, value);
            }
        }
        url
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "application/json")
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, column: &str, value: &str) -> Result<Option<T>, StoreError> {
        let url = self.table_url(table, &[(column, format!("eq.{}", value)), ("select", "*".to_string())]);
        debug!("Store request: GET {}", url);

        let response = self.authorized(self.http.get(url)).send().await?;
        let response = Self::expect_success(response).await?;
        let mut rows: Vec<T> = response.json().await?;
        Ok(if rows.is_empty() { None } else { Some(rows.swap_remove(0)) })
    }

    async fn patch<B: serde::Serialize + ?Sized>(&self, table: &str, id: &str, body: &B) -> Result<(), StoreError> {
        let url = self.table_url(table, &[("id", format!("eq.{}", id))]);
        debug!("Store request: PATCH {}", url);

        let response = self
            .authorized(self.http.patch(url))
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn expect_success(response: Response) -> Result<Response, StoreError> {
        match response.status() {
            StatusCode::OK | StatusCode::CREATED | StatusCode::NO_CONTENT => Ok(response),
            status => {
                let body = response.text().await.unwrap_or_default();
                error!("Store request failed: HTTP {} {}", status, body);
                Err(StoreError::Rejected { status: status.as_u16(), body })
            }
        }
    }
}

#[async_trait]
impl AccountStore for RestStore {
    async fn find_account(&self, tenant_key: &str) -> Result<Option<AccountRecord>, StoreError> {
        self.select(&self.accounts_table, "id", tenant_key).await
    }

    async fn insert_account(&self, record: &AccountRecord) -> Result<(), StoreError> {
        let url = self.table_url(&self.accounts_table, &[]);
        debug!("Store request: POST {}", url);

        let response = self
            .authorized(self.http.post(url))
            .header("Prefer", "return=minimal")
            .json(record)
            .send()
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn patch_account(&self, tenant_key: &str, patch: &AccountPatch) -> Result<(), StoreError> {
        self.patch(&self.accounts_table, tenant_key, patch).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let url = self.table_url(&self.accounts_table, &[("select", "id".to_string()), ("limit", "1".to_string())]);
        let response = self.authorized(self.http.get(url)).send().await?;
        Self::expect_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for RestStore {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        self.select(&self.users_table, "username", username).await
    }

    async fn find_user(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        self.select(&self.users_table, "id", id).await
    }

    async fn touch_last_connection(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.patch(&self.users_table, id, &json!({ "last_conexion": at.to_rfc3339() })).await
    }
}

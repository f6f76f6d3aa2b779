//! HTTP client for the dashboard API, used by the poll driver and the CLI.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use url::Url;

use crate::gateway::QrPayload;
use crate::poll::ConnectionApi;
use crate::services::StatusOutcome;
use crate::store::{AccountRecord, ConnectionStatus};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server url: {0}")]
    InvalidUrl(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server responded {status}: {message}")]
    Api { status: u16, message: String, body: Value },

    #[error("not logged in")]
    NotAuthenticated,

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error("server returned no QR code")]
    NoQrCode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginReply {
    pub token: String,
    pub user: Value,
}

#[derive(Clone)]
pub struct DashboardClient {
    base_url: Url,
    token: Option<String>,
    http: Client,
}

impl DashboardClient {
    pub fn new(server: &str, token: Option<String>) -> Result<Self, ClientError> {
        let base_url = Url::parse(server).map_err(|e| ClientError::InvalidUrl(format!("{}: {}", server, e)))?;
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self { base_url, token, http })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", path, e)))
    }

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        let token = self.token.as_deref().ok_or(ClientError::NotAuthenticated)?;
        Ok(builder.bearer_auth(token))
    }

    /// Decode a JSON body, turning `success: false` or a non-2xx status into `ClientError::Api`
    async fn read(response: Response) -> Result<Value, ClientError> {
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

        let succeeded = body.get("success").and_then(Value::as_bool).unwrap_or(false);
        if !status.is_success() || !succeeded {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("request failed")
                .to_string();
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
                body,
            });
        }
        Ok(body)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginReply, ClientError> {
        let response = self
            .http
            .post(self.endpoint("api/auth/login")?)
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;
        let body = Self::read(response).await?;
        serde_json::from_value(body).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    pub async fn profile(&self) -> Result<Value, ClientError> {
        let request = self.authorized(self.http.get(self.endpoint("api/auth/profile")?))?;
        let body = Self::read(request.send().await?).await?;
        Ok(body.get("user").cloned().unwrap_or(Value::Null))
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        let response = self.http.post(self.endpoint("api/auth/logout")?).send().await?;
        Self::read(response).await.map(|_| ())
    }
}

#[async_trait]
impl ConnectionApi for DashboardClient {
    async fn status(&self) -> Result<StatusOutcome, ClientError> {
        let request = self.authorized(self.http.get(self.endpoint("api/whatsapp/status")?))?;
        let body = Self::read(request.send().await?).await?;

        if body.get("status").and_then(Value::as_str) == Some("not_found") {
            return Ok(StatusOutcome::NotFound);
        }
        let account = body
            .get("account")
            .cloned()
            .ok_or_else(|| ClientError::InvalidResponse("status response has no account".to_string()))?;
        let account: AccountRecord =
            serde_json::from_value(account).map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        Ok(StatusOutcome::Account(account))
    }

    async fn create_instance(&self, instance_name: &str) -> Result<Option<QrPayload>, ClientError> {
        let request = self
            .authorized(self.http.post(self.endpoint("api/whatsapp/create-instance")?))?
            .json(&json!({ "instanceName": instance_name }));
        let body = Self::read(request.send().await?).await?;
        Ok(QrPayload::from_response(&body))
    }

    async fn check_connection(&self, instance_name: &str) -> Result<Value, ClientError> {
        let mut url = self.endpoint("api/whatsapp/check-connection/")?;
        let shown = url.to_string();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(shown))?
            .pop_if_empty()
            .push(instance_name);

        let request = self.authorized(self.http.get(url))?;
        let body = Self::read(request.send().await?).await?;
        Ok(body.get("status").cloned().unwrap_or(Value::Null))
    }

    async fn update_status(&self, status: ConnectionStatus, instance_name: &str) -> Result<(), ClientError> {
        let request = self
            .authorized(self.http.post(self.endpoint("api/whatsapp/update-status")?))?
            .json(&json!({ "status": status, "instanceName": instance_name }));
        Self::read(request.send().await?).await.map(|_| ())
    }
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::{CreateInstanceRequest, Gateway, GatewayError};
use crate::config::GatewayConfig;

/// Evolution-style gateway client authenticated with a static `apikey` header
#[derive(Clone)]
pub struct EvolutionClient {
    base_url: Url,
    api_key: String,
    http: Client,
}

impl EvolutionClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| GatewayError::Unreachable(format!("invalid gateway url '{}': {}", config.base_url, e)))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;

        Ok(Self {
            base_url,
            api_key: config.api_key.clone(),
            http,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Body as JSON, falling back to the raw text so error details survive
    async fn body_value(response: Response) -> Value {
        let text = response.text().await.unwrap_or_default();
        if text.trim().is_empty() {
            return Value::Null;
        }
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    }
}

#[async_trait]
impl Gateway for EvolutionClient {
    async fn fetch_instance(&self, name: &str) -> Result<Option<Value>, GatewayError> {
        let mut url = self.endpoint(&["instance", "fetchInstances"]);
        url.query_pairs_mut().append_pair("instanceName", name);
        debug!("Gateway request: GET {}", url);

        let response = self.http.get(url).header("apikey", &self.api_key).send().await?;
        let status = response.status();
        let body = Self::body_value(response).await;

        if status != StatusCode::OK {
            return Err(GatewayError::Rejected { status: status.as_u16(), body });
        }

        let exists = match &body {
            Value::Array(items) => !items.is_empty(),
            Value::Object(map) => !map.is_empty(),
            Value::Null => false,
            _ => true,
        };
        Ok(exists.then_some(body))
    }

    async fn connection_state(&self, name: &str) -> Result<Value, GatewayError> {
        let url = self.endpoint(&["instance", "connectionState", name]);
        debug!("Gateway request: GET {}", url);

        let response = self.http.get(url).header("apikey", &self.api_key).send().await?;
        let status = response.status();
        let body = Self::body_value(response).await;

        if !status.is_success() {
            warn!("Gateway connection state for '{}' returned HTTP {}", name, status);
            return Err(GatewayError::Rejected { status: status.as_u16(), body });
        }
        if let Value::String(raw) = &body {
            return Err(GatewayError::InvalidResponse(format!("non-JSON connection state: {}", raw)));
        }
        Ok(body)
    }

    async fn create_instance(&self, request: &CreateInstanceRequest) -> Result<Value, GatewayError> {
        let url = self.endpoint(&["instance", "create"]);
        debug!("Gateway request: POST {} (instance '{}')", url, request.instance_name);

        let response = self
            .http
            .post(url)
            .header("apikey", &self.api_key)
            .json(request)
            .send()
            .await?;
        let status = response.status();
        let body = Self::body_value(response).await;

        match status {
            StatusCode::OK | StatusCode::CREATED => Ok(body),
            _ => {
                warn!("Gateway refused to create instance '{}': HTTP {}", request.instance_name, status);
                Err(GatewayError::Rejected { status: status.as_u16(), body })
            }
        }
    }
}

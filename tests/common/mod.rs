#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::{json, Value};

use wa_dashboard_api::app::app;
use wa_dashboard_api::config::AppConfig;
use wa_dashboard_api::gateway::EvolutionClient;
use wa_dashboard_api::state::AppState;
use wa_dashboard_api::store::{AccountRecord, MemoryStore, Stores};

pub const GATEWAY_KEY: &str = "test-gateway-key";

/// Router served on a free port, backed by an in-memory store and a mock gateway
pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    pub store: Arc<MemoryStore>,
    pub gateway: mockito::ServerGuard,
    client: reqwest::Client,
}

impl TestServer {
    pub async fn start() -> Result<Self> {
        let gateway = mockito::Server::new_async().await;

        let store = Arc::new(MemoryStore::new());
        store.add_user(MemoryStore::user("1", "ana", "s3cret", "tenant-1"));
        store.add_user(MemoryStore::user("2", "keyless", "s3cret", ""));

        let mut config = AppConfig::development();
        config.security.jwt_secret = "integration-test-secret".to_string();
        config.gateway.base_url = gateway.url();
        config.gateway.api_key = GATEWAY_KEY.to_string();
        config.gateway.webhook_url = "https://hooks.example.com/msjreceived".to_string();
        config.gateway.timeout_secs = 5;

        let evolution = EvolutionClient::new(&config.gateway)?;
        let state = AppState::new(config, Stores::from_backend(store.clone()), Arc::new(evolution));

        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app(state)).await;
        });

        let server = Self {
            port,
            base_url,
            store,
            gateway,
            client: reqwest::Client::new(),
        };
        server.wait_ready(Duration::from_secs(5)).await?;
        Ok(server)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(resp) = self.client.get(self.url("/health")).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub async fn login(&self, username: &str) -> Result<String> {
        let body: Value = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "username": username, "password": "s3cret" }))
            .send()
            .await?
            .json()
            .await?;
        body["token"]
            .as_str()
            .map(str::to_string)
            .with_context(|| format!("login failed: {}", body))
    }

    pub async fn get(&self, path: &str, token: &str) -> Result<(StatusCode, Value)> {
        let res = self.client.get(self.url(path)).bearer_auth(token).send().await?;
        Ok((res.status(), res.json().await?))
    }

    pub async fn post(&self, path: &str, token: &str, body: Value) -> Result<(StatusCode, Value)> {
        let res = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        Ok((res.status(), res.json().await?))
    }

    pub fn seed_account(&self, tenant_key: &str, instance_name: &str, connected: bool) {
        let mut record = AccountRecord::new(tenant_key, instance_name);
        if connected {
            record.connection_status = wa_dashboard_api::store::ConnectionStatus::Connected;
            record.connection_timestamp = Some(chrono::Utc::now());
        }
        self.store.add_account(record);
    }
}

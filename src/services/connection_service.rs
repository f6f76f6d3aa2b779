//! Server half of the QR connection lifecycle.
//!
//! The account row caches whether a tenant's gateway instance is connected.
//! The gateway is the source of truth, so a cached `connected` is re-verified
//! on every status read and downgraded when the gateway disagrees. The only
//! path that marks a row `connected` is [`ConnectionController::update_status`],
//! called once by the poll loop that saw the instance open.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use super::ServiceError;
use crate::gateway::{ConnectionState, CreateInstanceRequest, Gateway, QrPayload};
use crate::store::{AccountPatch, AccountRecord, AccountStore, ConnectionStatus};

/// Result of a status read
#[derive(Debug, Clone, PartialEq)]
pub enum StatusOutcome {
    /// No account row for the tenant; the caller has nothing to provision
    NotFound,
    Account(AccountRecord),
}

pub struct ConnectionController {
    gateway: Arc<dyn Gateway>,
    accounts: Arc<dyn AccountStore>,
    webhook_url: String,
}

impl ConnectionController {
    pub fn new(gateway: Arc<dyn Gateway>, accounts: Arc<dyn AccountStore>, webhook_url: impl Into<String>) -> Self {
        Self {
            gateway,
            accounts,
            webhook_url: webhook_url.into(),
        }
    }

    /// Read the tenant's account row, re-verifying a cached `connected` against the gateway
    pub async fn get_status(&self, tenant_key: &str) -> Result<StatusOutcome, ServiceError> {
        let Some(mut account) = self.accounts.find_account(tenant_key).await? else {
            info!("No account row for tenant '{}'", tenant_key);
            return Ok(StatusOutcome::NotFound);
        };

        if account.is_connected() && !self.is_instance_open(&account.instance_name).await {
            warn!(
                "Instance '{}' of tenant '{}' is no longer open; downgrading to disconnected",
                account.instance_name, tenant_key
            );
            self.accounts
                .patch_account(tenant_key, &AccountPatch::status(ConnectionStatus::Disconnected))
                .await?;
            account.connection_status = ConnectionStatus::Disconnected;
        }

        Ok(StatusOutcome::Account(account))
    }

    /// Hand out a QR for `instance_name`, reusing an existing gateway instance when it has one
    pub async fn provision_instance(&self, tenant_key: &str, instance_name: &str) -> Result<Option<QrPayload>, ServiceError> {
        let name = instance_name.trim();
        if name.is_empty() {
            return Err(ServiceError::required("instanceName", "Instance name is required"));
        }

        match self.gateway.fetch_instance(name).await {
            Ok(Some(_)) => {
                info!("Instance '{}' already exists for tenant '{}', fetching its QR", name, tenant_key);
                match self.gateway.connection_state(name).await {
                    Ok(state) => {
                        if let Some(qr) = QrPayload::from_response(&state) {
                            return Ok(Some(qr));
                        }
                    }
                    Err(e) => warn!("Could not read state of existing instance '{}': {}", name, e),
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Existence check for instance '{}' failed, creating it: {}", name, e),
        }

        let request = CreateInstanceRequest::whatsapp(name, &self.webhook_url);
        let body = self
            .gateway
            .create_instance(&request)
            .await
            .map_err(|source| ServiceError::Gateway {
                context: "Failed to create instance",
                source,
            })?;

        info!("Created gateway instance '{}' for tenant '{}'", name, tenant_key);
        Ok(QrPayload::from_response(&body))
    }

    /// Raw gateway connection state; no persistence side effect
    pub async fn check_connection(&self, instance_name: &str) -> Result<Value, ServiceError> {
        let name = instance_name.trim();
        if name.is_empty() {
            return Err(ServiceError::required("instanceName", "Instance name is required"));
        }

        self.gateway
            .connection_state(name)
            .await
            .map_err(|source| ServiceError::Gateway {
                context: "Failed to check connection",
                source,
            })
    }

    /// Create-or-patch the tenant's account row with a new status
    pub async fn update_status(&self, tenant_key: &str, status: &str, instance_name: &str) -> Result<(), ServiceError> {
        let status: ConnectionStatus = status
            .parse()
            .map_err(|e: String| ServiceError::required("status", e))?;
        let name = instance_name.trim();
        if name.is_empty() {
            return Err(ServiceError::required("instanceName", "Instance name is required"));
        }

        let patch = AccountPatch {
            connection_status: Some(status),
            instance_name: Some(name.to_string()),
            connection_timestamp: match status {
                ConnectionStatus::Connected => Some(Some(Utc::now())),
                ConnectionStatus::Disconnected => Some(None),
            },
        };
        self.accounts.upsert_account(tenant_key, &patch).await?;

        info!("Tenant '{}' instance '{}' marked {}", tenant_key, name, status);
        Ok(())
    }

    async fn is_instance_open(&self, instance_name: &str) -> bool {
        if instance_name.is_empty() {
            return false;
        }
        match self.gateway.connection_state(instance_name).await {
            Ok(payload) => ConnectionState::from_payload(&payload).is_open(),
            Err(e) => {
                warn!("Connection state of '{}' unavailable: {}", instance_name, e);
                false
            }
        }
    }
}

use std::sync::Arc;

use crate::config::AppConfig;
use crate::gateway::Gateway;
use crate::services::{AuthService, ConnectionController};
use crate::store::Stores;

/// Shared handler state; cloned per request
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub stores: Stores,
    pub controller: Arc<ConnectionController>,
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub fn new(config: AppConfig, stores: Stores, gateway: Arc<dyn Gateway>) -> Self {
        let controller = ConnectionController::new(gateway, stores.accounts.clone(), config.gateway.webhook_url.clone());
        let auth = AuthService::new(stores.users.clone(), config.security.clone());

        Self {
            config: Arc::new(config),
            stores,
            controller: Arc::new(controller),
            auth: Arc::new(auth),
        }
    }
}

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub gateway: GatewayConfig,
    pub store: StoreConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

/// Messaging gateway (Evolution-style API) connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: String,
    /// Receiver registered on every created instance for connection/message events
    pub webhook_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Rest,
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Base URL of the REST store (the `/rest/v1` suffix is appended by the client)
    pub url: String,
    pub api_key: String,
    pub accounts_table: String,
    pub users_table: String,
    pub timeout_secs: u64,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub enable_request_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("JWT_SECRET must be set outside development")]
    MissingJwtSecret,
    #[error("DATABASE_URL must be set when STORE_BACKEND=postgres")]
    MissingDatabaseUrl,
    #[error("{0} must be set when STORE_BACKEND=rest")]
    MissingStoreSetting(&'static str),
    #[error("{0} must be set")]
    MissingGatewaySetting(&'static str),
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // API overrides
        if let Some(v) = env::var("WA_API_PORT").ok().or_else(|| env::var("PORT").ok()) {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }

        // Gateway overrides
        if let Ok(v) = env::var("GATEWAY_URL") {
            self.gateway.base_url = v.trim_end_matches('/').to_string();
        }
        if let Ok(v) = env::var("GATEWAY_API_KEY") {
            self.gateway.api_key = v;
        }
        if let Ok(v) = env::var("GATEWAY_WEBHOOK_URL") {
            self.gateway.webhook_url = v;
        }
        if let Ok(v) = env::var("GATEWAY_TIMEOUT_SECS") {
            self.gateway.timeout_secs = v.parse().unwrap_or(self.gateway.timeout_secs);
        }

        // Store overrides
        match env::var("STORE_BACKEND").as_deref() {
            Ok("rest") => self.store.backend = StoreBackend::Rest,
            Ok("postgres") | Ok("pg") => self.store.backend = StoreBackend::Postgres,
            Ok("memory") => self.store.backend = StoreBackend::Memory,
            _ => {}
        }
        if let Ok(v) = env::var("STORE_URL") {
            self.store.url = v.trim_end_matches('/').to_string();
        }
        if let Ok(v) = env::var("STORE_API_KEY") {
            self.store.api_key = v;
        }
        if let Ok(v) = env::var("STORE_ACCOUNTS_TABLE") {
            self.store.accounts_table = v;
        }
        if let Ok(v) = env::var("STORE_USERS_TABLE") {
            self.store.users_table = v;
        }
        if let Ok(v) = env::var("STORE_TIMEOUT_SECS") {
            self.store.timeout_secs = v.parse().unwrap_or(self.store.timeout_secs);
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            self.store.database_url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.store.max_connections = v.parse().unwrap_or(self.store.max_connections);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }

        // Tokens signed with an ephemeral secret die with the process
        if self.security.jwt_secret.is_empty() && self.environment == Environment::Development {
            self.security.jwt_secret = format!("dev-{}", uuid::Uuid::new_v4().simple());
        }

        self
    }

    /// Reject configurations the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.jwt_secret.is_empty() {
            return Err(ConfigError::MissingJwtSecret);
        }
        if self.gateway.base_url.is_empty() {
            return Err(ConfigError::MissingGatewaySetting("GATEWAY_URL"));
        }
        if self.gateway.api_key.is_empty() {
            return Err(ConfigError::MissingGatewaySetting("GATEWAY_API_KEY"));
        }
        match self.store.backend {
            StoreBackend::Rest => {
                if self.store.url.is_empty() {
                    return Err(ConfigError::MissingStoreSetting("STORE_URL"));
                }
                if self.store.api_key.is_empty() {
                    return Err(ConfigError::MissingStoreSetting("STORE_API_KEY"));
                }
            }
            StoreBackend::Postgres => {
                if self.store.database_url.is_none() {
                    return Err(ConfigError::MissingDatabaseUrl);
                }
            }
            StoreBackend::Memory => {}
        }
        Ok(())
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            gateway: GatewayConfig {
                base_url: "http://localhost:8080".to_string(),
                api_key: String::new(),
                webhook_url: "http://localhost:5678/webhook/msjreceived".to_string(),
                timeout_secs: 30,
            },
            store: StoreConfig {
                backend: StoreBackend::Memory,
                url: String::new(),
                api_key: String::new(),
                accounts_table: "whitelabel_2_accounts".to_string(),
                users_table: "whitelabel_1_users".to_string(),
                timeout_secs: 30,
                database_url: None,
                max_connections: 5,
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: true,
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
                jwt_secret: String::new(),
                jwt_expiry_hours: 24 * 7, // 1 week
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            gateway: GatewayConfig {
                base_url: String::new(),
                api_key: String::new(),
                webhook_url: String::new(),
                timeout_secs: 20,
            },
            store: StoreConfig {
                backend: StoreBackend::Rest,
                url: String::new(),
                api_key: String::new(),
                accounts_table: "whitelabel_2_accounts".to_string(),
                users_table: "whitelabel_1_users".to_string(),
                timeout_secs: 15,
                database_url: None,
                max_connections: 10,
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: true,
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            gateway: GatewayConfig {
                base_url: String::new(),
                api_key: String::new(),
                webhook_url: String::new(),
                timeout_secs: 15,
            },
            store: StoreConfig {
                backend: StoreBackend::Rest,
                url: String::new(),
                api_key: String::new(),
                accounts_table: "whitelabel_2_accounts".to_string(),
                users_table: "whitelabel_1_users".to_string(),
                timeout_secs: 10,
                database_url: None,
                max_connections: 20,
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: false,
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
                jwt_secret: String::new(),
                jwt_expiry_hours: 24 * 7,
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_development {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Development)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.gateway.timeout_secs, 30);
        assert_eq!(config.security.jwt_expiry_hours, 168);
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert_eq!(config.store.backend, StoreBackend::Rest);
        assert!(config.gateway.timeout_secs <= 30);
        assert!(!config.api.enable_request_logging);
    }

    #[test]
    fn production_requires_jwt_secret() {
        let mut config = AppConfig::production();
        config.gateway.base_url = "https://gateway.example.com".to_string();
        config.gateway.api_key = "key".to_string();
        config.store.url = "https://store.example.com".to_string();
        config.store.api_key = "anon".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::MissingJwtSecret)));

        config.security.jwt_secret = "secret".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn postgres_backend_requires_database_url() {
        let mut config = AppConfig::development();
        config.gateway.api_key = "key".to_string();
        config.security.jwt_secret = "secret".to_string();
        config.store.backend = StoreBackend::Postgres;
        assert!(matches!(config.validate(), Err(ConfigError::MissingDatabaseUrl)));
    }
}

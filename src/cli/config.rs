use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::DashboardClient;

pub const DEFAULT_SERVER: &str = "http://localhost:3000";

/// Persisted CLI session, `session.json` in the config dir
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub server: Option<String>,
    pub token: Option<String>,
    pub username: Option<String>,
    /// Last instance a QR was shown for, reused by `regenerate`
    pub instance_name: Option<String>,
    pub logged_in_at: Option<DateTime<Utc>>,
}

impl SessionConfig {
    /// `--server` wins over the saved server, which wins over the default
    pub fn server_url(&self, override_server: Option<&str>) -> String {
        override_server
            .map(str::to_string)
            .or_else(|| self.server.clone())
            .unwrap_or_else(|| DEFAULT_SERVER.to_string())
    }

    pub fn client(&self, override_server: Option<&str>) -> anyhow::Result<DashboardClient> {
        let client = DashboardClient::new(&self.server_url(override_server), self.token.clone())?;
        Ok(client)
    }

    pub fn require_token(&self) -> anyhow::Result<&str> {
        self.token
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Not logged in; run `wadash login <username>` first"))
    }
}

pub fn get_config_dir() -> anyhow::Result<PathBuf> {
    let config_dir = if let Ok(custom_dir) = std::env::var("WADASH_CONFIG_DIR") {
        PathBuf::from(custom_dir)
    } else {
        let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("HOME environment variable not set"))?;
        PathBuf::from(home).join(".config").join("wadash")
    };

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

pub fn load_session_config() -> anyhow::Result<SessionConfig> {
    let session_file = get_config_dir()?.join("session.json");

    if !session_file.exists() {
        return Ok(SessionConfig::default());
    }

    let content = fs::read_to_string(session_file)?;
    let config: SessionConfig = serde_json::from_str(&content)?;
    Ok(config)
}

pub fn save_session_config(config: &SessionConfig) -> anyhow::Result<()> {
    let session_file = get_config_dir()?.join("session.json");

    let content = serde_json::to_string_pretty(config)?;
    fs::write(session_file, content)?;
    Ok(())
}

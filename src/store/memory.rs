use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::{AccountPatch, AccountRecord, AccountStore, StoreError, UserRecord, UserStore};

/// In-process store for development and tests
#[derive(Default)]
pub struct MemoryStore {
    accounts: RwLock<HashMap<String, AccountRecord>>,
    users: RwLock<Vec<UserRecord>>,
}

#[derive(Debug, Deserialize)]
struct SeedFile {
    #[serde(default)]
    users: Vec<UserRecord>,
    #[serde(default)]
    accounts: Vec<AccountRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load users and accounts from a JSON file shaped `{ "users": [...], "accounts": [...] }`
    pub fn from_seed_file(path: &str) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Config(format!("cannot read seed file '{}': {}", path, e)))?;
        let seed: SeedFile = serde_json::from_str(&content).map_err(|e| StoreError::Decode(e.to_string()))?;

        let store = Self::new();
        for user in seed.users {
            store.add_user(user);
        }
        for account in seed.accounts {
            store.add_account(account);
        }
        Ok(store)
    }

    pub fn add_user(&self, user: UserRecord) {
        if let Ok(mut users) = self.users.write() {
            users.push(user);
        }
    }

    pub fn add_account(&self, account: AccountRecord) {
        if let Ok(mut accounts) = self.accounts.write() {
            accounts.insert(account.tenant_key.clone(), account);
        }
    }

    /// Snapshot of a stored account
    pub fn account(&self, tenant_key: &str) -> Option<AccountRecord> {
        self.accounts.read().ok()?.get(tenant_key).cloned()
    }

    /// Convenience for building a user row
    pub fn user(id: &str, username: &str, password: &str, key: &str) -> UserRecord {
        UserRecord {
            id: id.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            key: key.to_string(),
            extra: serde_json::Map::new(),
        }
    }

    fn poisoned() -> StoreError {
        StoreError::Unavailable("memory store lock poisoned".to_string())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn find_account(&self, tenant_key: &str) -> Result<Option<AccountRecord>, StoreError> {
        let accounts = self.accounts.read().map_err(|_| Self::poisoned())?;
        Ok(accounts.get(tenant_key).cloned())
    }

    async fn insert_account(&self, record: &AccountRecord) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write().map_err(|_| Self::poisoned())?;
        if accounts.contains_key(&record.tenant_key) {
            return Err(StoreError::Rejected {
                status: 409,
                body: format!("account '{}' already exists", record.tenant_key),
            });
        }
        accounts.insert(record.tenant_key.clone(), record.clone());
        Ok(())
    }

    async fn patch_account(&self, tenant_key: &str, patch: &AccountPatch) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write().map_err(|_| Self::poisoned())?;
        // Patching a missing row matches nothing, as on the REST backend
        if let Some(record) = accounts.get_mut(tenant_key) {
            record.apply(patch);
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.accounts.read().map(|_| ()).map_err(|_| Self::poisoned())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let users = self.users.read().map_err(|_| Self::poisoned())?;
        Ok(users.iter().find(|u| u.username == username).cloned())
    }

    async fn find_user(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        let users = self.users.read().map_err(|_| Self::poisoned())?;
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    async fn touch_last_connection(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut users = self.users.write().map_err(|_| Self::poisoned())?;
        if let Some(user) = users.iter_mut().find(|u| u.id == id) {
            user.extra.insert("last_conexion".to_string(), Value::String(at.to_rfc3339()));
        }
        Ok(())
    }
}

use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use super::ServiceError;
use crate::auth::{generate_jwt, Claims};
use crate::config::SecurityConfig;
use crate::store::{UserRecord, UserStore};

/// Issued session: the bearer token plus the user row (password never serialized)
#[derive(Debug, Clone)]
pub struct LoginResult {
    pub token: String,
    pub user: UserRecord,
}

pub struct AuthService {
    users: Arc<dyn UserStore>,
    security: SecurityConfig,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, security: SecurityConfig) -> Self {
        Self { users, security }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResult, ServiceError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ServiceError::required("username", "Username and password are required"));
        }
        if password.is_empty() {
            return Err(ServiceError::required("password", "Username and password are required"));
        }

        let user = match self.users.find_user_by_username(username).await? {
            Some(user) if passwords_match(password, &user.password) => user,
            _ => {
                info!("Rejected login for '{}'", username);
                return Err(ServiceError::InvalidCredentials);
            }
        };

        if let Err(e) = self.users.touch_last_connection(&user.id, Utc::now()).await {
            warn!("Could not record last connection for user {}: {}", user.id, e);
        }

        let claims = Claims::new(
            user.id.clone(),
            user.username.clone(),
            user.key.clone(),
            self.security.jwt_expiry_hours,
        );
        let token = generate_jwt(&claims, &self.security)?;

        info!("User '{}' logged in", user.username);
        Ok(LoginResult { token, user })
    }

    pub async fn profile(&self, user_id: &str) -> Result<UserRecord, ServiceError> {
        self.users
            .find_user(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))
    }
}

// Compare fixed-length digests so the comparison does not depend on input length
fn passwords_match(supplied: &str, stored: &str) -> bool {
    !stored.is_empty() && Sha256::digest(supplied.as_bytes()) == Sha256::digest(stored.as_bytes())
}

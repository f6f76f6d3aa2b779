pub mod auth_service;
pub mod connection_service;

use thiserror::Error;

use crate::auth::JwtError;
use crate::gateway::GatewayError;
use crate::store::StoreError;

pub use auth_service::{AuthService, LoginResult};
pub use connection_service::{ConnectionController, StatusOutcome};

/// Failures of the service layer, mapped to HTTP by `ApiError`
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{message}")]
    Validation { field: &'static str, message: String },

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{context}: {source}")]
    Gateway {
        context: &'static str,
        #[source]
        source: GatewayError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Token(#[from] JwtError),
}

impl ServiceError {
    pub fn required(field: &'static str, message: impl Into<String>) -> Self {
        ServiceError::Validation {
            field,
            message: message.into(),
        }
    }
}

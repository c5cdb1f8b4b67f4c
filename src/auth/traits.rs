use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::events::{AuthCallback, Subscription};
use crate::error::StoreError;

/// Seconds before expiry at which a session is treated as stale
const EXPIRY_MARGIN_SECS: i64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Signed-in session as issued by the auth service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix timestamp (seconds)
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: User,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|at| at - EXPIRY_MARGIN_SECS <= Utc::now().timestamp())
            .unwrap_or(false)
    }
}

/// Kind of session change pushed to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// Auth subsystem of the hosted backend
#[async_trait]
pub trait AuthClient: Send + Sync {
    /// Current session, if any; may refresh an expired one
    async fn get_session(&self) -> Result<Option<Session>, StoreError>;

    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> Result<Session, StoreError>;

    /// Register a new account. Returns a session only when the service
    /// signs the user in immediately (no email confirmation).
    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>, StoreError>;

    async fn sign_out(&self) -> Result<(), StoreError>;

    /// Be told about every session change until the returned guard is released
    fn subscribe(&self, callback: AuthCallback) -> Subscription;
}

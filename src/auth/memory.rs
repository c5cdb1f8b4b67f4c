use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use super::events::{AuthCallback, AuthEvents, Subscription};
use super::traits::{AuthClient, AuthEvent, Session, User};
use crate::error::StoreError;

/// In-process auth service with password accounts and the same push
/// notifications as the hosted one
#[derive(Default)]
pub struct MemoryAuth {
    accounts: Mutex<HashMap<String, (String, String)>>,
    session: Mutex<Option<Session>>,
    failure: Mutex<Option<String>>,
    events: AuthEvents,
}

impl MemoryAuth {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Service with one confirmed account, for running the CLI offline
    pub fn demo() -> Self {
        let mut accounts = HashMap::new();
        accounts.insert(
            "demo@homelands.dk".to_string(),
            ("demo-user-1".to_string(), "demo1234".to_string()),
        );

        Self {
            accounts: Mutex::new(accounts),
            ..Self::default()
        }
    }

    /// Start out already signed in, as if a session had been restored
    #[cfg(test)]
    pub async fn set_session(&self, session: Option<Session>) {
        *self.session.lock().await = session;
    }

    #[cfg(test)]
    pub async fn fail_next(&self, message: &str) {
        *self.failure.lock().await = Some(message.to_string());
    }

    /// Push a session change to subscribers without touching stored state
    #[cfg(test)]
    pub fn push(&self, event: AuthEvent, session: Option<&Session>) {
        self.events.publish(event, session);
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.events.subscriber_count()
    }

    async fn begin(&self) -> Result<(), StoreError> {
        match self.failure.lock().await.take() {
            Some(message) => Err(StoreError::Auth(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AuthClient for MemoryAuth {
    async fn get_session(&self) -> Result<Option<Session>, StoreError> {
        self.begin().await?;
        Ok(self.session.lock().await.clone())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, StoreError> {
        self.begin().await?;
        let user_id = match self.accounts.lock().await.get(email) {
            Some((id, stored)) if stored == password => id.clone(),
            _ => return Err(StoreError::Auth("Invalid login credentials".to_string())),
        };

        let session = Session {
            access_token: format!("memory-token-{}", user_id),
            refresh_token: None,
            expires_at: None,
            user: User {
                id: user_id,
                email: Some(email.to_string()),
            },
        };
        *self.session.lock().await = Some(session.clone());
        info!("Signed in {}", email);
        self.events.publish(AuthEvent::SignedIn, Some(&session));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>, StoreError> {
        self.begin().await?;
        let mut accounts = self.accounts.lock().await;
        if accounts.contains_key(email) {
            return Err(StoreError::Auth("User already registered".to_string()));
        }

        let user_id = format!("memory-user-{}", accounts.len() + 1);
        accounts.insert(email.to_string(), (user_id, password.to_string()));
        info!("Registered {}", email);
        Ok(None)
    }

    async fn sign_out(&self) -> Result<(), StoreError> {
        self.begin().await?;
        *self.session.lock().await = None;
        self.events.publish(AuthEvent::SignedOut, None);
        Ok(())
    }

    fn subscribe(&self, callback: AuthCallback) -> Subscription {
        self.events.subscribe(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registered_account_can_sign_in() {
        let auth = MemoryAuth::new();
        assert!(auth.sign_up("ny@kunde.dk", "hemmelig").await.unwrap().is_none());

        let session = auth.sign_in_with_password("ny@kunde.dk", "hemmelig").await.unwrap();
        assert_eq!(session.user.email.as_deref(), Some("ny@kunde.dk"));
        assert_eq!(auth.get_session().await.unwrap(), Some(session));
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let auth = MemoryAuth::demo();
        let err = auth
            .sign_in_with_password("demo@homelands.dk", "forkert")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid login credentials");
    }

    #[tokio::test]
    async fn duplicate_registration_fails() {
        let auth = MemoryAuth::demo();
        assert!(auth.sign_up("demo@homelands.dk", "x").await.is_err());
    }
}

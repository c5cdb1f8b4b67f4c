use std::io::ErrorKind;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::events::{AuthCallback, AuthEvents, Subscription};
use super::traits::{AuthClient, AuthEvent, Session};
use crate::config::Config;
use crate::error::StoreError;
use crate::store::postgrest::{build_client, check};
use crate::store::AccessToken;

#[derive(Default)]
struct Slot {
    session: Option<Session>,
    restored: bool,
}

/// Client for the hosted auth API.
///
/// The session is persisted to `Config::session_file` so it survives
/// between CLI invocations, and mirrored into the shared [`AccessToken`].
pub struct SupabaseAuth {
    client: Client,
    config: Config,
    access_token: AccessToken,
    slot: Mutex<Slot>,
    events: AuthEvents,
}

impl SupabaseAuth {
    pub fn new(config: Config, access_token: AccessToken) -> anyhow::Result<Self> {
        let client = build_client(&config)?;
        Ok(Self {
            client,
            config,
            access_token,
            slot: Mutex::new(Slot::default()),
            events: AuthEvents::default(),
        })
    }

    async fn post(&self, endpoint: &str, body: Value, bearer: Option<&str>) -> Result<Value, StoreError> {
        let url = self.config.auth_url(endpoint);
        debug!("POST {}", url);

        let mut request = self
            .client
            .post(&url)
            .header("apikey", &self.config.api_key)
            .json(&body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = check(request.send().await?).await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn restore(&self) -> Option<Session> {
        let path = &self.config.session_file;
        match tokio::fs::read_to_string(path).await {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(session) => {
                    debug!("Restored session from {}", path.display());
                    Some(session)
                }
                Err(e) => {
                    warn!("Ignoring unreadable session file {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Failed to read session file {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn persist(&self, session: Option<&Session>) {
        let path = &self.config.session_file;
        let result = match session {
            Some(session) => match serde_json::to_string_pretty(session) {
                Ok(json) => tokio::fs::write(path, json).await,
                Err(e) => {
                    warn!("Failed to encode session: {}", e);
                    return;
                }
            },
            None => match tokio::fs::remove_file(path).await {
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                other => other,
            },
        };

        if let Err(e) = result {
            warn!("Failed to update session file {}: {}", path.display(), e);
        }
    }

    /// Install `session` as current, persist it, and notify subscribers
    async fn install(&self, slot: &mut Slot, session: Option<Session>, event: AuthEvent) {
        self.access_token
            .set(session.as_ref().map(|s| s.access_token.clone()));
        self.persist(session.as_ref()).await;
        slot.session = session;
        self.events.publish(event, slot.session.as_ref());
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, StoreError> {
        info!("Refreshing expired session");
        let body = self
            .post(
                "token?grant_type=refresh_token",
                json!({ "refresh_token": refresh_token }),
                None,
            )
            .await?;
        Ok(serde_json::from_value(body)?)
    }
}

#[async_trait]
impl AuthClient for SupabaseAuth {
    async fn get_session(&self) -> Result<Option<Session>, StoreError> {
        let mut slot = self.slot.lock().await;
        if !slot.restored {
            slot.restored = true;
            slot.session = self.restore().await;
            self.access_token
                .set(slot.session.as_ref().map(|s| s.access_token.clone()));
        }

        let refresh_token = match &slot.session {
            Some(session) if session.is_expired() => session.refresh_token.clone(),
            _ => return Ok(slot.session.clone()),
        };

        match refresh_token {
            Some(token) => match self.refresh(&token).await {
                Ok(session) => {
                    self.install(&mut slot, Some(session), AuthEvent::TokenRefreshed)
                        .await;
                }
                Err(e) => {
                    warn!("Session refresh failed: {}", e);
                    self.install(&mut slot, None, AuthEvent::SignedOut).await;
                }
            },
            None => {
                info!("Stored session expired");
                self.install(&mut slot, None, AuthEvent::SignedOut).await;
            }
        }

        Ok(slot.session.clone())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, StoreError> {
        info!("Signing in {}", email);
        let body = self
            .post(
                "token?grant_type=password",
                json!({ "email": email, "password": password }),
                None,
            )
            .await?;
        let session: Session = serde_json::from_value(body)?;

        let mut slot = self.slot.lock().await;
        slot.restored = true;
        self.install(&mut slot, Some(session.clone()), AuthEvent::SignedIn)
            .await;
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>, StoreError> {
        info!("Registering {}", email);
        let body = self
            .post("signup", json!({ "email": email, "password": password }), None)
            .await?;

        if body.get("access_token").is_none() {
            info!("Account created, awaiting email confirmation");
            return Ok(None);
        }

        let session: Session = serde_json::from_value(body)?;
        let mut slot = self.slot.lock().await;
        slot.restored = true;
        self.install(&mut slot, Some(session.clone()), AuthEvent::SignedIn)
            .await;
        Ok(Some(session))
    }

    async fn sign_out(&self) -> Result<(), StoreError> {
        let mut slot = self.slot.lock().await;
        if !slot.restored {
            slot.restored = true;
            slot.session = self.restore().await;
        }

        let remote = match &slot.session {
            Some(session) => {
                info!("Signing out {}", session.user.email.as_deref().unwrap_or("user"));
                self.post("logout", json!({}), Some(&session.access_token))
                    .await
                    .map(|_| ())
            }
            None => Ok(()),
        };

        // The local session goes away even when the remote call fails.
        self.install(&mut slot, None, AuthEvent::SignedOut).await;
        remote
    }

    fn subscribe(&self, callback: AuthCallback) -> Subscription {
        self.events.subscribe(callback)
    }
}

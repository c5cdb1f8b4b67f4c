use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, error, info};

use super::events::Subscription;
use super::traits::{AuthClient, AuthEvent, Session};
use crate::error::StoreError;

/// Application-visible login state
#[derive(Debug, Clone, Default, PartialEq)]
pub enum AuthState {
    #[default]
    Anonymous,
    /// `user_id` is empty only after an optimistic [`SessionObserver::login`]
    Authenticated {
        user_id: Option<String>,
        email: Option<String>,
    },
}

impl AuthState {
    fn from_session(session: Option<&Session>) -> Self {
        match session {
            Some(session) => AuthState::Authenticated {
                user_id: Some(session.user.id.clone()),
                email: session.user.email.clone(),
            },
            None => AuthState::Anonymous,
        }
    }

    pub fn is_logged_in(&self) -> bool {
        matches!(self, AuthState::Authenticated { .. })
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            AuthState::Authenticated { user_id, .. } => user_id.as_deref(),
            AuthState::Anonymous => None,
        }
    }

    pub fn user_email(&self) -> Option<&str> {
        match self {
            AuthState::Authenticated { email, .. } => email.as_deref(),
            AuthState::Anonymous => None,
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: AuthState,
    pushes: u64,
}

/// Read-only view of the login state handed to consumers
#[derive(Debug, Clone, Default)]
pub struct AuthHandle {
    shared: Arc<RwLock<Shared>>,
}

impl AuthHandle {
    pub fn current(&self) -> AuthState {
        self.shared
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .state
            .clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.current().is_logged_in()
    }

    pub fn user_id(&self) -> Option<String> {
        self.current().user_id().map(str::to_string)
    }

    pub fn user_email(&self) -> Option<String> {
        self.current().user_email().map(str::to_string)
    }

    fn write<R>(&self, f: impl FnOnce(&mut Shared) -> R) -> R {
        f(&mut self.shared.write().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Mirrors the auth service's session into an [`AuthHandle`].
///
/// The observer is the only writer of the state. Its push subscription is
/// released when the observer is stopped or dropped.
pub struct SessionObserver {
    auth: Arc<dyn AuthClient>,
    handle: AuthHandle,
    subscription: Option<Subscription>,
}

impl SessionObserver {
    /// Subscribe to session changes, then query the current session once.
    ///
    /// A push that lands while the query is in flight wins over the query
    /// result. A failed query leaves the state anonymous.
    pub async fn start(auth: Arc<dyn AuthClient>) -> Self {
        let handle = AuthHandle::default();

        let writer = handle.clone();
        let subscription = auth.subscribe(Box::new(move |event: AuthEvent, session: Option<&Session>| {
            let state = AuthState::from_session(session);
            debug!("Session change {:?}: logged in = {}", event, state.is_logged_in());
            writer.write(|shared| {
                shared.state = state;
                shared.pushes += 1;
            });
        }));

        let pushes_before = handle.write(|shared| shared.pushes);
        match auth.get_session().await {
            Ok(Some(session)) => handle.write(|shared| {
                if shared.pushes == pushes_before {
                    shared.state = AuthState::from_session(Some(&session));
                    info!("Resumed session for {}", session.user.email.as_deref().unwrap_or("user"));
                }
            }),
            Ok(None) => debug!("No current session"),
            Err(e) => error!("Error checking session: {}", e),
        }

        Self {
            auth,
            handle,
            subscription: Some(subscription),
        }
    }

    pub fn handle(&self) -> AuthHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> AuthState {
        self.handle.current()
    }

    /// Optimistically mark `email` as logged in until the service confirms.
    ///
    /// Any user id already known is kept.
    pub fn login(&self, email: &str) {
        self.handle.write(|shared| {
            let user_id = shared.state.user_id().map(str::to_string);
            shared.state = AuthState::Authenticated {
                user_id,
                email: Some(email.to_string()),
            };
        });
    }

    /// Sign out remotely and go anonymous; the state is cleared even if the
    /// remote call fails
    pub async fn logout(&self) -> Result<(), StoreError> {
        let result = self.auth.sign_out().await;
        self.handle.write(|shared| shared.state = AuthState::Anonymous);
        if let Err(e) = &result {
            error!("Sign-out failed: {}", e);
        }
        result
    }

    /// Release the push subscription
    pub fn stop(mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::events::{AuthCallback, AuthEvents, Subscription};
    use crate::auth::memory::MemoryAuth;
    use crate::auth::traits::User;
    use async_trait::async_trait;

    fn session(id: &str, email: &str) -> Session {
        Session {
            access_token: format!("token-{}", id),
            refresh_token: None,
            expires_at: None,
            user: User {
                id: id.to_string(),
                email: Some(email.to_string()),
            },
        }
    }

    /// Reports a stored session, but signs out while that lookup is running
    struct SignsOutDuringLookup {
        events: AuthEvents,
    }

    #[async_trait]
    impl AuthClient for SignsOutDuringLookup {
        async fn get_session(&self) -> Result<Option<Session>, StoreError> {
            self.events.publish(AuthEvent::SignedOut, None);
            Ok(Some(session("u-stale", "gammel@example.dk")))
        }

        async fn sign_in_with_password(&self, _: &str, _: &str) -> Result<Session, StoreError> {
            Err(StoreError::Auth("unsupported".to_string()))
        }

        async fn sign_up(&self, _: &str, _: &str) -> Result<Option<Session>, StoreError> {
            Ok(None)
        }

        async fn sign_out(&self) -> Result<(), StoreError> {
            Ok(())
        }

        fn subscribe(&self, callback: AuthCallback) -> Subscription {
            self.events.subscribe(callback)
        }
    }

    #[tokio::test]
    async fn push_during_lookup_wins_over_lookup_result() {
        let auth = Arc::new(SignsOutDuringLookup {
            events: AuthEvents::default(),
        });

        let observer = SessionObserver::start(auth).await;
        assert_eq!(observer.state(), AuthState::Anonymous);
        assert!(!observer.handle().is_logged_in());
    }

    #[tokio::test]
    async fn starts_from_existing_session() {
        let auth = Arc::new(MemoryAuth::new());
        auth.set_session(Some(session("u-1", "kunde@example.dk"))).await;

        let observer = SessionObserver::start(auth.clone()).await;
        assert_eq!(
            observer.state(),
            AuthState::Authenticated {
                user_id: Some("u-1".to_string()),
                email: Some("kunde@example.dk".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn failed_session_query_stays_anonymous() {
        let auth = Arc::new(MemoryAuth::new());
        auth.fail_next("network down").await;

        let observer = SessionObserver::start(auth.clone()).await;
        assert_eq!(observer.state(), AuthState::Anonymous);
    }

    #[tokio::test]
    async fn follows_pushed_notifications() {
        let auth = Arc::new(MemoryAuth::new());
        let observer = SessionObserver::start(auth.clone()).await;
        let handle = observer.handle();

        auth.push(AuthEvent::SignedIn, Some(&session("u-2", "b@example.dk")));
        assert!(handle.is_logged_in());
        assert_eq!(handle.user_id().as_deref(), Some("u-2"));
        assert_eq!(handle.user_email().as_deref(), Some("b@example.dk"));

        auth.push(AuthEvent::TokenRefreshed, None);
        assert_eq!(handle.current(), AuthState::Anonymous);
    }

    #[tokio::test]
    async fn optimistic_login_has_email_only() {
        let auth = Arc::new(MemoryAuth::new());
        let observer = SessionObserver::start(auth.clone()).await;

        observer.login("ny@example.dk");
        assert_eq!(
            observer.state(),
            AuthState::Authenticated {
                user_id: None,
                email: Some("ny@example.dk".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn push_supersedes_optimistic_login() {
        let auth = Arc::new(MemoryAuth::demo());
        let observer = SessionObserver::start(auth.clone()).await;

        auth.sign_in_with_password("demo@homelands.dk", "demo1234")
            .await
            .unwrap();
        observer.login("demo@homelands.dk");

        assert_eq!(observer.handle().user_id().as_deref(), Some("demo-user-1"));
    }

    #[tokio::test]
    async fn logout_forces_anonymous_even_on_failure() {
        let auth = Arc::new(MemoryAuth::new());
        auth.set_session(Some(session("u-1", "a@example.dk"))).await;
        let observer = SessionObserver::start(auth.clone()).await;
        assert!(observer.state().is_logged_in());

        auth.fail_next("timeout").await;
        assert!(observer.logout().await.is_err());
        assert_eq!(observer.state(), AuthState::Anonymous);
    }

    #[tokio::test]
    async fn stopping_releases_subscription() {
        let auth = Arc::new(MemoryAuth::new());
        let observer = SessionObserver::start(auth.clone()).await;
        let handle = observer.handle();
        assert_eq!(auth.subscriber_count(), 1);

        observer.stop();
        assert_eq!(auth.subscriber_count(), 0);

        auth.push(AuthEvent::SignedIn, Some(&session("u-3", "c@example.dk")));
        assert!(!handle.is_logged_in());
    }
}

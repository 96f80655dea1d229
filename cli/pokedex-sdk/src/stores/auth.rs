//! Session state of the current user.
//!
//! The store is the only writer of the persisted token.
//! The client reads it whenever it sends an authenticated request.
//!
//! [AuthStore::logout] ends the current *generation* of the store.
//! A login or session check started before it won't apply its result.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use pokedex_api::token::{TokenStorage, TokenStore};
use pokedex_api::types::{LoginCredentials, User};
use pokedex_api::{AuthError, Client, ClientTrait};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// An authenticated user together with the token that proves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: User,
    pub token: String,
}

/// A session operation in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthActivity {
    /// Verifying a persisted token
    Checking,
    LoggingIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Anonymous,
    Checking,
    LoggingIn,
    Authenticated,
}

/// A snapshot of the auth store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    pub session: Option<Session>,
    pub activity: Option<AuthActivity>,
    /// Message of the last failed login
    pub error: Option<String>,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.activity.is_some()
    }

    pub fn user(&self) -> Option<&User> {
        self.session.as_ref().map(|session| &session.user)
    }

    pub fn token(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.token.as_str())
    }

    pub fn phase(&self) -> AuthPhase {
        match (self.activity, &self.session) {
            (Some(AuthActivity::Checking), _) => AuthPhase::Checking,
            (Some(AuthActivity::LoggingIn), _) => AuthPhase::LoggingIn,
            (None, Some(_)) => AuthPhase::Authenticated,
            (None, None) => AuthPhase::Anonymous,
        }
    }
}

#[derive(Debug)]
pub struct AuthStore {
    client: Arc<Client>,
    tokens: Arc<TokenStore>,
    state: watch::Sender<AuthState>,
    generation: AtomicU64,
}

impl AuthStore {
    pub fn new(client: Arc<Client>, tokens: Arc<TokenStore>) -> Self {
        let (state, _) = watch::channel(AuthState::default());
        Self {
            client,
            tokens,
            state,
            generation: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Receive a notification for every change of the auth state.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Log in and load the user.
    ///
    /// The token is persisted before the user is requested, as that request
    /// is authenticated with it. If either step fails, the token is removed
    /// again, the session ends and the error is both recorded and returned.
    ///
    /// A [Self::logout] while the login is in flight cancels it,
    /// nothing is persisted and [AuthError::Cancelled] is returned.
    #[instrument(skip_all, fields(username = %credentials.username))]
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<(), AuthError> {
        if let Err(err) = credentials.validate() {
            debug!(%err, "invalid login form");
            self.state
                .send_modify(|state| state.error = Some(err.to_string()));
            return Err(err.into());
        }

        let generation = self.generation.load(Ordering::SeqCst);
        self.state.send_modify(|state| {
            state.activity = Some(AuthActivity::LoggingIn);
            state.error = None;
        });

        match self.establish_session(credentials, generation).await {
            Err(AuthError::Cancelled) => {
                debug!("logged out while logging in");
                Err(AuthError::Cancelled)
            },
            Ok(session) => {
                info!(user_id = session.user.id, "logged in");
                self.state.send_modify(|state| {
                    state.session = Some(session);
                    state.activity = None;
                });
                Ok(())
            },
            Err(err) => {
                debug!(%err, "login failed");
                self.discard_token();
                self.state.send_modify(|state| {
                    state.session = None;
                    state.activity = None;
                    state.error = Some(err.to_string());
                });
                Err(err)
            },
        }
    }

    async fn establish_session(
        &self,
        credentials: &LoginCredentials,
        generation: u64,
    ) -> Result<Session, AuthError> {
        let token = self.client.login(credentials).await;
        if self.is_stale(generation) {
            return Err(AuthError::Cancelled);
        }
        let token = token?;
        self.tokens.write(&token.access_token)?;

        let user = self.client.current_user().await;
        if self.is_stale(generation) {
            // logout already removed the token written above
            return Err(AuthError::Cancelled);
        }
        Ok(Session {
            user: user?,
            token: token.access_token,
        })
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }

    /// Restore the session from a persisted token.
    ///
    /// Without a token no request is sent. A token the backend rejects is
    /// removed silently, no error is recorded.
    /// Returns whether a session was established.
    #[instrument(skip_all)]
    pub async fn check_auth(&self) -> bool {
        let token = match self.tokens.read() {
            Ok(token) => token,
            Err(err) => {
                warn!(%err, "could not read stored token, discarding it");
                self.discard_token();
                None
            },
        };

        let Some(token) = token else {
            debug!("no stored token");
            self.state.send_if_modified(|state| {
                let modified = state.session.is_some() || state.activity.is_some();
                state.session = None;
                state.activity = None;
                modified
            });
            return false;
        };

        let generation = self.generation.load(Ordering::SeqCst);
        self.state
            .send_modify(|state| state.activity = Some(AuthActivity::Checking));

        let result = self.client.current_user().await;
        if self.is_stale(generation) {
            debug!("logged out while checking the session");
            return false;
        }

        match result {
            Ok(user) => {
                debug!(user_id = user.id, "stored session is valid");
                self.state.send_modify(|state| {
                    state.session = Some(Session { user, token });
                    state.activity = None;
                });
                true
            },
            Err(err) => {
                debug!(%err, "stored session is no longer valid");
                self.discard_token();
                self.state.send_modify(|state| {
                    state.session = None;
                    state.activity = None;
                });
                false
            },
        }
    }

    /// End the session, including a login or session check in flight.
    /// Calling it while anonymous has no effect.
    #[instrument(skip_all)]
    pub fn logout(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.discard_token();
        let logged_out = self.state.send_if_modified(|state| {
            let modified = *state != AuthState::default();
            *state = AuthState::default();
            modified
        });
        if logged_out {
            info!("logged out");
        }
    }

    pub fn clear_error(&self) {
        self.state.send_if_modified(|state| state.error.take().is_some());
    }

    fn discard_token(&self) {
        if let Err(err) = self.tokens.clear() {
            warn!(%err, "could not remove stored token");
        }
    }
}

//! Giftful auth client
//!
//! Email/password authentication against a GoTrue-compatible auth server,
//! with session persistence and a broadcast of session changes.
//!
//! Every change to the current session (sign in, sign out, token refresh,
//! session restored from storage) is published on the channel returned by
//! [`Auth::on_auth_state_change`].

mod session;
mod storage;

use log::{debug, info, warn};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tokio::sync::broadcast;

pub use session::{decode_claims, AccessTokenClaims, Session, User};
pub use storage::{FileStorage, KeyringStorage, MemoryStorage, SessionStorage};

/// Errors produced by [`Auth`]
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("API error: {message} (Status: {status})")]
    ApiError {
        status: StatusCode,
        code: Option<String>,
        message: String,
    },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Missing session")]
    MissingSession,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Session storage error: {0}")]
    Storage(String),
}

impl AuthError {
    /// HTTP status of the failed response, when there was one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            AuthError::ApiError { status, .. } => Some(*status),
            AuthError::NetworkError(e) => e.status(),
            _ => None,
        }
    }
}

/// Error body variants GoTrue has used over time
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    error_description: Option<String>,
    error_code: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

impl ErrorBody {
    fn into_error(self, status: StatusCode, raw: String) -> AuthError {
        let code = self.error_code.or_else(|| self.error.clone());
        let message = self
            .error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
            .unwrap_or(raw);
        AuthError::ApiError {
            status,
            code,
            message,
        }
    }
}

/// Kind of session change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChangeEvent {
    /// A session was restored from storage
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// Notification published whenever the current session changes
#[derive(Debug, Clone)]
pub struct AuthChange {
    pub event: AuthChangeEvent,
    pub session: Option<Session>,
}

/// Result of a sign-up.
///
/// `session` is `None` when the server requires email confirmation first.
#[derive(Debug, Clone)]
pub struct SignUpResponse {
    pub user: User,
    pub session: Option<Session>,
}

/// Client options
#[derive(Debug, Clone)]
pub struct AuthOptions {
    pub auto_refresh_token: bool,
    pub persist_session: bool,
    /// Storage key the session is persisted under
    pub storage_key: String,
    /// Refresh this many seconds before the access token expires
    pub refresh_margin_secs: i64,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            auto_refresh_token: true,
            persist_session: true,
            storage_key: "giftful.auth.session".to_string(),
            refresh_margin_secs: 60,
        }
    }
}

/// Auth client
pub struct Auth {
    url: String,
    key: String,
    http_client: Client,
    options: AuthOptions,
    storage: Arc<dyn SessionStorage>,
    current_session: Arc<RwLock<Option<Session>>>,
    state_change: broadcast::Sender<AuthChange>,
}

impl Auth {
    /// Create an auth client that persists sessions in memory only
    pub fn new(url: &str, key: &str, http_client: Client, options: AuthOptions) -> Self {
        let (state_change, _) = broadcast::channel(16);
        Self {
            url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            http_client,
            options,
            storage: Arc::new(MemoryStorage::new()),
            current_session: Arc::new(RwLock::new(None)),
            state_change,
        }
    }

    /// Persist sessions in `storage`
    pub fn with_storage(mut self, storage: Arc<dyn SessionStorage>) -> Self {
        self.storage = storage;
        self
    }

    /// Subscribe to session changes
    pub fn on_auth_state_change(&self) -> broadcast::Receiver<AuthChange> {
        self.state_change.subscribe()
    }

    /// The session held in memory, without touching storage or the network
    pub fn current_session(&self) -> Option<Session> {
        self.read_session().clone()
    }

    /// The current session, restored from storage and refreshed when needed.
    ///
    /// Returns `Ok(None)` when nobody is signed in.
    pub async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        let session = match self.current_session() {
            Some(session) => session,
            None => match self.restore_session()? {
                Some(session) => {
                    *self.write_session() = Some(session.clone());
                    self.emit(AuthChangeEvent::InitialSession, Some(session.clone()));
                    session
                }
                None => return Ok(None),
            },
        };

        if self.options.auto_refresh_token
            && session.expires_within(self.options.refresh_margin_secs)
        {
            debug!("Access token for {} is about to expire; refreshing", session.user.id);
            return self.refresh_session().await.map(Some);
        }

        Ok(Some(session))
    }

    /// Register a new user
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpResponse, AuthError> {
        let url = format!("{}/auth/v1/signup", self.url);
        let payload = serde_json::json!({
            "email": email,
            "password": password,
        });

        let body: serde_json::Value = self.post(&url, &payload).await?;

        // Auto-confirmed projects answer with a session, others with the bare user.
        if body.get("access_token").is_some() {
            let session = serde_json::from_value::<Session>(body)?.normalized();
            self.store_session(&session, AuthChangeEvent::SignedIn);
            Ok(SignUpResponse {
                user: session.user.clone(),
                session: Some(session),
            })
        } else {
            let user = match body.get("user") {
                Some(user) => serde_json::from_value::<User>(user.clone())?,
                None => serde_json::from_value::<User>(body)?,
            };
            info!("Sign up for {} awaits email confirmation", user.id);
            Ok(SignUpResponse {
                user,
                session: None,
            })
        }
    }

    /// Sign in with email and password
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.url);
        let payload = serde_json::json!({
            "email": email,
            "password": password,
        });

        let session = self
            .post::<Session>(&url, &payload)
            .await?
            .normalized();
        self.store_session(&session, AuthChangeEvent::SignedIn);
        Ok(session)
    }

    /// Exchange the refresh token for a new session.
    ///
    /// A rejected refresh token signs the user out locally.
    pub async fn refresh_session(&self) -> Result<Session, AuthError> {
        let current = self.current_session().ok_or(AuthError::MissingSession)?;
        let url = format!("{}/auth/v1/token?grant_type=refresh_token", self.url);
        let payload = serde_json::json!({
            "refresh_token": current.refresh_token,
        });

        match self.post::<Session>(&url, &payload).await {
            Ok(session) => {
                let session = session.normalized();
                self.store_session(&session, AuthChangeEvent::TokenRefreshed);
                Ok(session)
            }
            Err(e) => {
                if matches!(e, AuthError::ApiError { status, .. } if status.is_client_error()) {
                    warn!("Refresh token rejected for {}; signing out", current.user.id);
                    self.clear_session();
                }
                Err(e)
            }
        }
    }

    /// Sign the current user out.
    ///
    /// The local session is always cleared; an expired or unknown token on
    /// the server side is not reported as an error.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let session = match self.current_session() {
            Some(session) => session,
            None => {
                self.clear_session();
                return Ok(());
            }
        };

        let url = format!("{}/auth/v1/logout", self.url);
        let result = self
            .http_client
            .post(&url)
            .header("apikey", &self.key)
            .bearer_auth(&session.access_token)
            .send()
            .await;

        self.clear_session();

        let response = result?;
        let status = response.status();
        if status.is_success()
            || status == StatusCode::UNAUTHORIZED
            || status == StatusCode::NOT_FOUND
        {
            return Ok(());
        }
        Err(Self::api_error(status, response.text().await?))
    }

    async fn post<T: DeserializeOwned>(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<T, AuthError> {
        let response = self
            .http_client
            .post(url)
            .header("apikey", &self.key)
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(Self::api_error(status, text));
        }
        Ok(serde_json::from_str(&text)?)
    }

    fn api_error(status: StatusCode, text: String) -> AuthError {
        serde_json::from_str::<ErrorBody>(&text)
            .unwrap_or_default()
            .into_error(status, text)
    }

    fn restore_session(&self) -> Result<Option<Session>, AuthError> {
        if !self.options.persist_session {
            return Ok(None);
        }
        match self.storage.load(&self.options.storage_key)? {
            Some(raw) => {
                let session = serde_json::from_str::<Session>(&raw)?.normalized();
                debug!("Restored session for {}", session.user.id);
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    fn store_session(&self, session: &Session, event: AuthChangeEvent) {
        *self.write_session() = Some(session.clone());

        if self.options.persist_session {
            let persisted = serde_json::to_string(session)
                .map_err(AuthError::from)
                .and_then(|raw| self.storage.save(&self.options.storage_key, &raw));
            if let Err(e) = persisted {
                warn!("Failed to persist session: {}", e);
            }
        }

        self.emit(event, Some(session.clone()));
    }

    fn clear_session(&self) {
        let had_session = self.write_session().take().is_some();

        if self.options.persist_session {
            if let Err(e) = self.storage.remove(&self.options.storage_key) {
                warn!("Failed to remove persisted session: {}", e);
            }
        }

        if had_session {
            self.emit(AuthChangeEvent::SignedOut, None);
        }
    }

    fn emit(&self, event: AuthChangeEvent, session: Option<Session>) {
        if self.state_change.send(AuthChange { event, session }).is_err() {
            debug!("No subscribers for auth event {:?}", event);
        }
    }

    fn read_session(&self) -> RwLockReadGuard<'_, Option<Session>> {
        self.current_session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_session(&self) -> RwLockWriteGuard<'_, Option<Session>> {
        self.current_session
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

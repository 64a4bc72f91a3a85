//! Auth/session store
//!
//! Holds the current session and the signed-in user's profile. Screens read
//! it through [`SessionStore::subscribe`]; only the store's own operations
//! change it.
//!
//! `loading` counts every tracked operation in flight (session load, profile
//! load, sign in, sign up, sign out). It drops back to `false` only when the
//! last of them has finished, however they overlap.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use giftful_auth::{Auth, AuthChange, AuthChangeEvent, AuthError, Session};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::Api;
use crate::cancel::run_until_cancelled;
use crate::error::{Error, Result};
use crate::models::{NewProfile, Profile};
use crate::validation;

/// Authentication backend the store drives
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Session persisted from an earlier run, refreshed when needed
    async fn load_session(&self) -> std::result::Result<Option<Session>, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> std::result::Result<Session, AuthError>;

    /// `None` when the account must be confirmed by email first
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> std::result::Result<Option<Session>, AuthError>;

    async fn sign_out(&self) -> std::result::Result<(), AuthError>;

    fn subscribe(&self) -> broadcast::Receiver<AuthChange>;
}

#[async_trait]
impl AuthProvider for Auth {
    async fn load_session(&self) -> std::result::Result<Option<Session>, AuthError> {
        self.get_session().await
    }

    async fn sign_in(&self, email: &str, password: &str) -> std::result::Result<Session, AuthError> {
        self.sign_in_with_password(email, password).await
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> std::result::Result<Option<Session>, AuthError> {
        Ok(Auth::sign_up(self, email, password).await?.session)
    }

    async fn sign_out(&self) -> std::result::Result<(), AuthError> {
        Auth::sign_out(self).await
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.on_auth_state_change()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Anonymous,
    Authenticating,
    /// Signed up but the welcome step has not created a profile yet
    AuthenticatedNoProfile,
    Authenticated,
}

/// Published state of the store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub session: Option<Session>,
    pub profile: Option<Profile>,
    pub loading: bool,
}

impl SessionSnapshot {
    pub fn phase(&self) -> SessionPhase {
        match (&self.session, &self.profile) {
            _ if self.loading => SessionPhase::Authenticating,
            (None, _) => SessionPhase::Anonymous,
            (Some(_), None) => SessionPhase::AuthenticatedNoProfile,
            (Some(_), Some(_)) => SessionPhase::Authenticated,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.user_id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// Signed in right away
    SignedIn,
    /// The account must be confirmed by email before signing in
    ConfirmationRequired,
}

struct Inner {
    provider: Arc<dyn AuthProvider>,
    api: Api,
    state: watch::Sender<SessionSnapshot>,
    in_flight: AtomicUsize,
    cancel: CancellationToken,
    listener: Mutex<Option<JoinHandle<()>>>,
}

/// Session and profile of the signed-in user
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

/// Keeps `loading` raised while alive
struct LoadingGuard<'a> {
    inner: &'a Inner,
}

impl<'a> LoadingGuard<'a> {
    fn new(inner: &'a Inner) -> Self {
        inner.in_flight.fetch_add(1, Ordering::SeqCst);
        inner.publish_loading();
        Self { inner }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.inner.publish_loading();
    }
}

impl Inner {
    fn publish_loading(&self) {
        self.state.send_if_modified(|snapshot| {
            let loading = self.in_flight.load(Ordering::SeqCst) > 0;
            let changed = snapshot.loading != loading;
            snapshot.loading = loading;
            changed
        });
    }
}

impl SessionStore {
    pub fn new(provider: Arc<dyn AuthProvider>, api: Api) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                provider,
                api,
                state,
                in_flight: AtomicUsize::new(0),
                cancel: CancellationToken::new(),
                listener: Mutex::new(None),
            }),
        }
    }

    /// Restore the persisted session, load its profile and start following
    /// session changes.
    ///
    /// A session that fails to load is logged and leaves the store anonymous.
    pub async fn init(&self) -> Result<()> {
        self.start_listener();

        let loaded = {
            let _loading = self.track();
            run_until_cancelled(&self.inner.cancel, async {
                Ok::<_, Error>(self.inner.provider.load_session().await)
            })
            .await?
        };

        let session = match loaded {
            Ok(Some(session)) => session,
            Ok(None) => {
                debug!("no persisted session");
                return Ok(());
            }
            Err(e) => {
                warn!(error = %e, "failed to load session");
                return Ok(());
            }
        };

        let profile = match self.load_profile(session.user_id()).await {
            Ok(profile) => profile,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                warn!(user_id = %session.user_id(), error = %e, "failed to load profile");
                None
            }
        };
        self.write(Some(session), profile);
        Ok(())
    }

    /// Stop following session changes and abandon in-flight operations
    pub async fn teardown(&self) {
        self.inner.cancel.cancel();
        let listener = self
            .inner
            .listener
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(handle) = listener {
            if let Err(e) = handle.await {
                warn!(error = %e, "session listener ended abnormally");
            }
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SessionSnapshot> {
        validation::email(email)?;
        validation::password(password)?;

        let loading = self.track();
        let session = run_until_cancelled(&self.inner.cancel, async {
            self.inner
                .provider
                .sign_in(email.trim(), password)
                .await
                .map_err(Error::from)
        })
        .await?;
        info!(user_id = %session.user_id(), "signed in");

        let profile = self.load_profile(session.user_id()).await;
        if matches!(profile, Err(Error::Cancelled)) {
            return Err(Error::Cancelled);
        }
        let (profile, failure) = match profile {
            Ok(profile) => (profile, None),
            Err(e) => (None, Some(e)),
        };
        self.write(Some(session), profile);
        drop(loading);
        match failure {
            Some(e) => Err(e),
            None => Ok(self.snapshot()),
        }
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome> {
        validation::email(email)?;
        validation::password(password)?;

        let _loading = self.track();
        let session = run_until_cancelled(&self.inner.cancel, async {
            self.inner
                .provider
                .sign_up(email.trim(), password)
                .await
                .map_err(Error::from)
        })
        .await?;

        let Some(session) = session else {
            info!("sign up awaits email confirmation");
            return Ok(SignUpOutcome::ConfirmationRequired);
        };
        info!(user_id = %session.user_id(), "signed up");

        let profile = self.load_profile(session.user_id()).await;
        if matches!(profile, Err(Error::Cancelled)) {
            return Err(Error::Cancelled);
        }
        let (profile, failure) = match profile {
            Ok(profile) => (profile, None),
            Err(e) => (None, Some(e)),
        };
        self.write(Some(session), profile);
        match failure {
            Some(e) => Err(e),
            None => Ok(SignUpOutcome::SignedIn),
        }
    }

    /// Sign out. Local state is cleared even when the backend call fails.
    pub async fn sign_out(&self) -> Result<()> {
        let _loading = self.track();
        let result = run_until_cancelled(&self.inner.cancel, async {
            Ok::<_, Error>(self.inner.provider.sign_out().await)
        })
        .await?;

        self.write(None, None);
        match result {
            Ok(()) => {
                info!("signed out");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "sign out failed on the backend");
                Err(e.into())
            }
        }
    }

    /// Replace the profile of the signed-in user
    pub fn set_profile(&self, profile: Profile) -> Result<()> {
        let mut result = Ok(());
        self.inner.state.send_if_modified(|snapshot| match &snapshot.session {
            Some(session) if session.user_id() == profile.id => {
                snapshot.profile = Some(profile);
                true
            }
            Some(_) => {
                result = Err(validation::ValidationError::new(
                    "id",
                    "profile belongs to another user",
                )
                .into());
                false
            }
            None => {
                result = Err(Error::Unauthenticated);
                false
            }
        });
        result
    }

    /// Create the profile on the welcome step after sign up
    pub async fn complete_onboarding(&self, mut profile: NewProfile) -> Result<Profile> {
        let user_id = self
            .snapshot()
            .user_id()
            .map(str::to_string)
            .ok_or(Error::Unauthenticated)?;
        profile.id = user_id;

        let created = {
            let _loading = self.track();
            run_until_cancelled(&self.inner.cancel, self.inner.api.profiles().create(&profile))
                .await?
        };
        self.set_profile(created.clone())?;
        info!(user_id = %created.id, "onboarding completed");
        Ok(created)
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.borrow().clone()
    }

    pub fn loading(&self) -> bool {
        self.inner.state.borrow().loading
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.state.borrow().phase()
    }

    fn track(&self) -> LoadingGuard<'_> {
        LoadingGuard::new(&self.inner)
    }

    /// `Ok(None)` when the user has no profile row yet
    async fn load_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let _loading = self.track();
        let result = run_until_cancelled(
            &self.inner.cancel,
            self.inner.api.profiles().get_by_id(user_id),
        )
        .await;
        match result {
            Ok(profile) => Ok(Some(profile)),
            Err(e) if e.is_not_found() => {
                debug!(user_id, "no profile yet");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn write(&self, session: Option<Session>, profile: Option<Profile>) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        self.inner.state.send_modify(|snapshot| {
            snapshot.session = session;
            snapshot.profile = profile;
        });
    }

    fn start_listener(&self) {
        let mut listener = self
            .inner
            .listener
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        if listener.is_some() || self.inner.cancel.is_cancelled() {
            return;
        }

        let changes = self.inner.provider.subscribe();
        let cancel = self.inner.cancel.clone();
        let store = Arc::downgrade(&self.inner);
        *listener = Some(tokio::spawn(listen(store, changes, cancel)));
    }

    /// Re-derive state from a session change the store did not start itself
    async fn handle_change(&self, change: AuthChange) {
        match (change.event, change.session) {
            // Emitted by calls this store makes and handles itself
            (AuthChangeEvent::SignedIn, _) | (AuthChangeEvent::InitialSession, _) => {}
            (event, None) => {
                debug!(?event, "session ended");
                self.write(None, None);
            }
            (event, Some(session)) => {
                let current = self.snapshot();
                let same_user = current.user_id() == Some(session.user_id());
                if same_user && current.profile.is_some() {
                    debug!(?event, user_id = %session.user_id(), "session updated");
                    self.write(Some(session), current.profile);
                    return;
                }
                match self.load_profile(session.user_id()).await {
                    Ok(profile) => self.write(Some(session), profile),
                    Err(Error::Cancelled) => {}
                    Err(e) => {
                        warn!(user_id = %session.user_id(), error = %e, "failed to reload profile");
                        self.write(Some(session), None);
                    }
                }
            }
        }
    }
}

async fn listen(
    store: Weak<Inner>,
    mut changes: broadcast::Receiver<AuthChange>,
    cancel: CancellationToken,
) {
    loop {
        let change = tokio::select! {
            _ = cancel.cancelled() => break,
            change = changes.recv() => change,
        };
        match change {
            Ok(change) => {
                let Some(inner) = store.upgrade() else {
                    break;
                };
                SessionStore { inner }.handle_change(change).await;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "missed session changes");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!("session listener stopped");
}

//! Giftful client core
//!
//! State management and data orchestration for Giftful (wishlists, following
//! and share links) on top of a Supabase-style backend.
//!
//! [`Giftful`] is the context object screens are handed. It owns the auth
//! client and the session store and hands out per-screen pieces:
//!
//! - [`WishlistView`] for a user's wishlists and items
//! - [`ItemActions`] for pin, delete, update and reorder
//! - [`AccessGate`] for the shared wishlist view
//! - [`FollowToggle`] for the follow button

pub mod access;
pub mod api;
pub mod cancel;
pub mod config;
pub mod error;
pub mod models;
pub mod mutations;
pub mod session;
pub mod validation;
pub mod wishlist_view;

use std::sync::Arc;

use giftful_auth::{Auth, AuthOptions, FileStorage, KeyringStorage, MemoryStorage, SessionStorage};
use reqwest::Client;
use tracing::debug;

pub use crate::access::{AccessCheck, AccessGate};
pub use crate::api::Api;
pub use crate::config::{FeatureFlags, GiftfulConfig, MutationStrategy, SessionPersistence};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::mutations::{FollowToggle, ItemActions};
pub use crate::session::{SessionPhase, SessionSnapshot, SessionStore};
pub use crate::wishlist_view::{WishlistState, WishlistView};

/// The main entry point for the Giftful client
pub struct Giftful {
    config: GiftfulConfig,
    auth: Arc<Auth>,
    api: Api,
    session: SessionStore,
}

impl Giftful {
    /// Create a client. Nothing is loaded until [`Giftful::init`].
    ///
    /// # Example
    ///
    /// ```
    /// use giftful::{Giftful, GiftfulConfig};
    ///
    /// let giftful = Giftful::new(GiftfulConfig::new(
    ///     "https://your-project-url.supabase.co",
    ///     "your-anon-key",
    /// ))
    /// .unwrap();
    /// assert!(giftful.session().snapshot().session.is_none());
    /// ```
    pub fn new(config: GiftfulConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build()?;

        let storage: Arc<dyn SessionStorage> = match &config.session_persistence {
            SessionPersistence::Memory => Arc::new(MemoryStorage::new()),
            SessionPersistence::File(path) => Arc::new(FileStorage::new(path.clone())),
            SessionPersistence::Keyring { service } => Arc::new(KeyringStorage::new(service.clone())),
        };
        let auth = Arc::new(
            Auth::new(
                &config.url,
                &config.anon_key,
                http_client.clone(),
                AuthOptions::default(),
            )
            .with_storage(storage),
        );

        let api = Api::new(&config.url, &config.anon_key, http_client, auth.clone())
            .with_avatar_bucket(&config.avatar_bucket);
        let session = SessionStore::new(auth.clone(), api.clone());

        Ok(Self {
            config,
            auth,
            api,
            session,
        })
    }

    /// Restore the persisted session and start following session changes
    pub async fn init(&self) -> Result<()> {
        debug!(url = %self.config.url, "initializing");
        self.session.init().await
    }

    pub async fn teardown(&self) {
        self.session.teardown().await;
    }

    pub fn config(&self) -> &GiftfulConfig {
        &self.config
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    pub fn api(&self) -> &Api {
        &self.api
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Wishlist view of `user_id`, using the configured feature flags
    pub fn wishlist_view(&self, user_id: &str) -> Arc<WishlistView> {
        Arc::new(WishlistView::new(self.api.clone(), user_id, self.config.flags))
    }

    pub fn item_actions(&self, view: Arc<WishlistView>) -> ItemActions {
        ItemActions::new(view, self.config.mutation_strategy)
    }

    pub fn access_gate(&self) -> AccessGate {
        AccessGate::new(self.api.clone())
    }

    pub fn follow_toggle(&self, target_user_id: &str) -> FollowToggle {
        FollowToggle::new(self.api.clone(), target_user_id)
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::access::{AccessCheck, AccessGate};
    pub use crate::config::{FeatureFlags, GiftfulConfig, MutationStrategy};
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::models::*;
    pub use crate::mutations::{FollowToggle, ItemActions};
    pub use crate::session::{SessionPhase, SessionSnapshot, SessionStore};
    pub use crate::wishlist_view::WishlistView;
    pub use crate::Giftful;
}

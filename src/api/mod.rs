//! Typed data-access client
//!
//! [`Api`] hands out one sub-client per entity. Every call validates its
//! payload, sends the signed-in user's access token so row-level security
//! applies, and maps failures into [`Error`](crate::error::Error).

mod avatars;
mod follows;
mod items;
mod profiles;
mod share_tokens;
mod wishlists;

pub use avatars::Avatars;
pub use follows::Follows;
pub use items::Items;
pub use profiles::Profiles;
pub use share_tokens::ShareTokens;
pub use wishlists::Wishlists;

use std::sync::Arc;

use giftful_auth::Auth;
use giftful_postgrest::PostgrestClient;
use giftful_storage::StorageClient;
use reqwest::Client;
use serde_json::Value;

use crate::error::{Error, Result};

pub(crate) const PROFILES: &str = "profiles";
pub(crate) const WISHLISTS: &str = "wishlists";
pub(crate) const WISHLIST_ITEMS: &str = "wishlist_items";
pub(crate) const FOLLOWS: &str = "follows";
pub(crate) const SHARE_TOKENS: &str = "share_tokens";

pub const DEFAULT_AVATAR_BUCKET: &str = "avatars";

/// Source of the signed-in user's credentials
pub trait Credentials: Send + Sync {
    fn access_token(&self) -> Option<String>;
    fn user_id(&self) -> Option<String>;
}

impl Credentials for Auth {
    fn access_token(&self) -> Option<String> {
        self.current_session().map(|s| s.access_token)
    }

    fn user_id(&self) -> Option<String> {
        self.current_session().map(|s| s.user.id)
    }
}

/// No signed-in user; requests go out with the anonymous key only
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl Credentials for Anonymous {
    fn access_token(&self) -> Option<String> {
        None
    }

    fn user_id(&self) -> Option<String> {
        None
    }
}

/// Data-access client
#[derive(Clone)]
pub struct Api {
    url: String,
    key: String,
    http_client: Client,
    credentials: Arc<dyn Credentials>,
    avatar_bucket: String,
}

impl Api {
    pub fn new(url: &str, key: &str, http_client: Client, credentials: Arc<dyn Credentials>) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            http_client,
            credentials,
            avatar_bucket: DEFAULT_AVATAR_BUCKET.to_string(),
        }
    }

    pub fn with_avatar_bucket(mut self, bucket: &str) -> Self {
        self.avatar_bucket = bucket.to_string();
        self
    }

    pub fn profiles(&self) -> Profiles<'_> {
        Profiles::new(self)
    }

    pub fn wishlists(&self) -> Wishlists<'_> {
        Wishlists::new(self)
    }

    pub fn items(&self) -> Items<'_> {
        Items::new(self)
    }

    pub fn follows(&self) -> Follows<'_> {
        Follows::new(self)
    }

    pub fn share_tokens(&self) -> ShareTokens<'_> {
        ShareTokens::new(self)
    }

    pub fn avatars(&self) -> Avatars<'_> {
        Avatars::new(self)
    }

    /// Id of the signed-in user
    pub fn current_user_id(&self) -> Result<String> {
        self.credentials.user_id().ok_or(Error::Unauthenticated)
    }

    pub(crate) fn from(&self, table: &str) -> Result<PostgrestClient> {
        let client = PostgrestClient::new(&self.url, &self.key, table, self.http_client.clone());
        self.authorize(client)
    }

    pub(crate) fn rpc(&self, function: &str, params: Value) -> Result<PostgrestClient> {
        let client = PostgrestClient::rpc(
            &self.url,
            &self.key,
            function,
            params,
            self.http_client.clone(),
        );
        self.authorize(client)
    }

    pub(crate) fn storage(&self) -> StorageClient {
        let client = StorageClient::new(&self.url, &self.key, self.http_client.clone());
        match self.credentials.access_token() {
            Some(token) => client.with_auth(&token),
            None => client,
        }
    }

    pub(crate) fn avatar_bucket(&self) -> &str {
        &self.avatar_bucket
    }

    fn authorize(&self, client: PostgrestClient) -> Result<PostgrestClient> {
        match self.credentials.access_token() {
            Some(token) => Ok(client.with_auth(&token)?),
            None => Ok(client),
        }
    }
}

/// First row of a `return=representation` response
pub(crate) fn first_row<T>(rows: Vec<T>, what: &str) -> Result<T> {
    rows.into_iter().next().ok_or_else(|| Error::no_rows(what))
}

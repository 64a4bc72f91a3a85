//! Configuration options for the Giftful client

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::api::DEFAULT_AVATAR_BUCKET;
use crate::error::{Error, Result};

/// Feature flags, passed explicitly into the views that read them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureFlags {
    /// Show the home tab
    pub home_tab: bool,
    /// Allow more than one wishlist per user
    pub multi_wishlists: bool,
}

/// Where the auth session is persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPersistence {
    /// Nothing survives a restart
    Memory,
    /// Local key-value file
    File(PathBuf),
    /// Platform secure store under `service`
    Keyring { service: String },
}

/// How item mutations repair local state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutationStrategy {
    /// Patch locally first, roll back to the exact snapshot on failure
    #[default]
    Rollback,
    /// Call the backend, then refetch whether it succeeded or not
    Refetch,
}

/// Configuration for [`Giftful`](crate::Giftful)
#[derive(Debug, Clone)]
pub struct GiftfulConfig {
    /// Base URL of the backend project
    pub url: String,

    /// Anonymous API key
    pub anon_key: String,

    pub request_timeout: Option<Duration>,

    pub flags: FeatureFlags,

    pub session_persistence: SessionPersistence,

    /// Storage bucket holding profile avatars
    pub avatar_bucket: String,

    pub mutation_strategy: MutationStrategy,
}

impl GiftfulConfig {
    pub fn new(url: &str, anon_key: &str) -> Self {
        Self {
            url: url.to_string(),
            anon_key: anon_key.to_string(),
            request_timeout: Some(Duration::from_secs(30)),
            flags: FeatureFlags::default(),
            session_persistence: SessionPersistence::Memory,
            avatar_bucket: DEFAULT_AVATAR_BUCKET.to_string(),
            mutation_strategy: MutationStrategy::default(),
        }
    }

    /// Read the configuration from the environment.
    ///
    /// `SUPABASE_URL` and `SUPABASE_ANON_KEY` are required. The session is
    /// kept in the file named by `GIFTFUL_SESSION_FILE` when set, otherwise
    /// in the platform secure store.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |name: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| Error::Config(format!("{} is not set", name)))
        };

        let mut config = Self::new(&required("SUPABASE_URL")?, &required("SUPABASE_ANON_KEY")?);
        config.flags = FeatureFlags {
            home_tab: flag(lookup("GIFTFUL_FEATURE_HOME"))?,
            multi_wishlists: flag(lookup("GIFTFUL_FEATURE_MULTI_WISHLISTS"))?,
        };
        config.session_persistence = match lookup("GIFTFUL_SESSION_FILE") {
            Some(path) if !path.trim().is_empty() => SessionPersistence::File(PathBuf::from(path)),
            _ => SessionPersistence::Keyring {
                service: "giftful".to_string(),
            },
        };
        Ok(config)
    }

    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    pub fn with_flags(mut self, flags: FeatureFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_multi_wishlists(mut self, enabled: bool) -> Self {
        self.flags.multi_wishlists = enabled;
        self
    }

    pub fn with_home_tab(mut self, enabled: bool) -> Self {
        self.flags.home_tab = enabled;
        self
    }

    pub fn with_session_persistence(mut self, value: SessionPersistence) -> Self {
        self.session_persistence = value;
        self
    }

    pub fn with_avatar_bucket(mut self, bucket: &str) -> Self {
        self.avatar_bucket = bucket.to_string();
        self
    }

    pub fn with_mutation_strategy(mut self, strategy: MutationStrategy) -> Self {
        self.mutation_strategy = strategy;
        self
    }
}

fn flag(value: Option<String>) -> Result<bool> {
    let Some(value) = value else {
        return Ok(false);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => Ok(false),
        "1" | "true" | "yes" | "on" => Ok(true),
        other => Err(Error::Config(format!("invalid feature flag value: {}", other))),
    }
}

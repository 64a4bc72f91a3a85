//! Giftful domain model
//!
//! Rows as stored by the backend, plus the payloads used to create and
//! update them. Payloads implement [`Validate`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validation::{self, Validate, ValidationError};

const MAX_NAME_LEN: usize = 100;
const MAX_BIO_LEN: usize = 500;
const MAX_ITEM_NAME_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 1000;

/// One profile per authenticated user; `id` is the auth user id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub background_url: Option<String>,
}

/// Who may see a wishlist without a share token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Follower,
    Private,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wishlist {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub event_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    #[default]
    Pending,
    Pinned,
}

impl ItemStatus {
    /// The only transition an item status has
    pub fn toggled(self) -> Self {
        match self {
            ItemStatus::Pending => ItemStatus::Pinned,
            ItemStatus::Pinned => ItemStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishlistItem {
    pub id: String,
    pub wishlist_id: String,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: ItemStatus,
    /// Rank within the wishlist
    #[serde(default)]
    pub order: i64,
}

impl WishlistItem {
    pub fn is_pinned(&self) -> bool {
        self.status == ItemStatus::Pinned
    }

    /// Overwrite the fields carried by `update`
    pub fn apply(&mut self, update: &ItemUpdate) {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(url) = &update.url {
            self.url = Some(url.clone());
        }
        if let Some(description) = &update.description {
            self.description = Some(description.clone());
        }
    }
}

/// Sort pinned items first, each group by `order`. Stable.
pub fn sort_pinned_first(items: &mut [WishlistItem]) {
    items.sort_by_key(|item| (!item.is_pinned(), item.order));
}

/// Rearrange `items` to follow `ordered_ids` and rewrite `order` to match.
///
/// Items missing from `ordered_ids` keep their relative order after the
/// listed ones. Pinned items are not regrouped.
pub fn apply_order(items: &mut Vec<WishlistItem>, ordered_ids: &[String]) {
    let mut remaining = std::mem::take(items);
    for id in ordered_ids {
        if let Some(pos) = remaining.iter().position(|item| &item.id == id) {
            items.push(remaining.remove(pos));
        }
    }
    items.append(&mut remaining);
    for (rank, item) in items.iter_mut().enumerate() {
        item.order = rank as i64;
    }
}

/// Share link credential, one per wishlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareToken {
    pub wishlist_id: String,
    pub token: String,
    #[serde(default)]
    pub access_count: i64,
    #[serde(default)]
    pub last_accessed_at: Option<DateTime<Utc>>,
}

/// Directed follow edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Follow {
    pub follower_id: String,
    pub following_id: String,
}

impl Validate for Follow {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::required("follower_id", &self.follower_id, 64)?;
        validation::required("following_id", &self.following_id, 64)?;
        if self.follower_id == self.following_id {
            return Err(ValidationError::new("following_id", "cannot follow yourself"));
        }
        Ok(())
    }
}

/// Wishlist as shown in the wishlist view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WishlistSummary {
    pub id: String,
    pub name: String,
    pub event_id: Option<String>,
}

impl From<&Wishlist> for WishlistSummary {
    fn from(wishlist: &Wishlist) -> Self {
        Self {
            id: wishlist.id.clone(),
            name: wishlist.name.clone(),
            event_id: wishlist.event_id.clone(),
        }
    }
}

/// Profile created on the welcome step after sign up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewProfile {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_url: Option<String>,
}

impl NewProfile {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            bio: None,
            avatar_url: None,
            background_url: None,
        }
    }

    pub fn with_bio(mut self, bio: impl Into<String>) -> Self {
        self.bio = Some(bio.into());
        self
    }

    pub fn with_avatar_url(mut self, path: impl Into<String>) -> Self {
        self.avatar_url = Some(path.into());
        self
    }
}

impl Validate for NewProfile {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::required("id", &self.id, 64)?;
        validation::required("name", &self.name, MAX_NAME_LEN)?;
        validation::optional_max_length("bio", &self.bio, MAX_BIO_LEN)
    }
}

/// Partial profile update; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_url: Option<String>,
}

impl Validate for ProfileUpdate {
    fn validate(&self) -> Result<(), ValidationError> {
        if *self == Self::default() {
            return Err(ValidationError::new("profile", "no fields to update"));
        }
        if let Some(name) = &self.name {
            validation::required("name", name, MAX_NAME_LEN)?;
        }
        validation::optional_max_length("bio", &self.bio, MAX_BIO_LEN)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewWishlist {
    pub user_id: String,
    pub name: String,
    pub visibility: Visibility,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl NewWishlist {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
            visibility: Visibility::default(),
            event_id: None,
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }
}

impl Validate for NewWishlist {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::required("user_id", &self.user_id, 64)?;
        validation::required("name", &self.name, MAX_NAME_LEN)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WishlistUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl Validate for WishlistUpdate {
    fn validate(&self) -> Result<(), ValidationError> {
        if *self == Self::default() {
            return Err(ValidationError::new("wishlist", "no fields to update"));
        }
        match &self.name {
            Some(name) => validation::required("name", name, MAX_NAME_LEN),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewItem {
    pub wishlist_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
}

impl NewItem {
    pub fn new(wishlist_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            wishlist_id: wishlist_id.into(),
            name: name.into(),
            url: None,
            description: None,
            order: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

impl Validate for NewItem {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::required("wishlist_id", &self.wishlist_id, 64)?;
        validation::required("name", &self.name, MAX_ITEM_NAME_LEN)?;
        validation::optional_url("url", &self.url)?;
        validation::optional_max_length("description", &self.description, MAX_DESCRIPTION_LEN)
    }
}

/// Partial item update. Status only changes through the pin toggle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ItemUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Validate for ItemUpdate {
    fn validate(&self) -> Result<(), ValidationError> {
        if *self == Self::default() {
            return Err(ValidationError::new("item", "no fields to update"));
        }
        if let Some(name) = &self.name {
            validation::required("name", name, MAX_ITEM_NAME_LEN)?;
        }
        validation::optional_url("url", &self.url)?;
        validation::optional_max_length("description", &self.description, MAX_DESCRIPTION_LEN)
    }
}

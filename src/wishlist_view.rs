//! Wishlist view state
//!
//! Component-local state for a screen showing one user's wishlists: the
//! normalized wishlist list, the items of the active wishlist, and the
//! loading/error flags. Local edits never touch the network. Every write
//! bumps `revision`; local edits also bump `local_edits`, so the mutation
//! orchestrator can tell a newer edit from a fetch that landed while its
//! request was in flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::Api;
use crate::cancel::run_until_cancelled;
use crate::config::FeatureFlags;
use crate::error::{Error, ErrorKind, Result};
use crate::models::{sort_pinned_first, WishlistItem, WishlistSummary};

/// Fetch failure as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&Error> for ViewError {
    fn from(error: &Error) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WishlistState {
    pub wishlists: Vec<WishlistSummary>,
    pub active_wishlist_id: Option<String>,
    /// Items of the active wishlist, pinned first
    pub items: Vec<WishlistItem>,
    pub loading: bool,
    pub error: Option<ViewError>,
    /// Bumped by every write, fetches included
    pub revision: u64,
    /// Bumped by local edits only
    pub local_edits: u64,
}

/// A local edit and the items it replaced
#[derive(Debug, Clone)]
pub struct LocalEdit {
    pub previous: Vec<WishlistItem>,
    /// Revision the edit produced
    pub revision: u64,
    /// Local edit count the edit produced
    pub local_edits: u64,
}

/// Condition for applying an edit
#[derive(Debug, Clone, Copy)]
enum Guard {
    Always,
    /// Nothing was written since this revision
    Revision(u64),
    /// No local edit happened since this count; fetches may have
    LocalEdits(u64),
}

struct Loaded {
    wishlists: Vec<WishlistSummary>,
    active_wishlist_id: Option<String>,
    items: Vec<WishlistItem>,
}

pub struct WishlistView {
    api: Api,
    user_id: String,
    flags: FeatureFlags,
    state: watch::Sender<WishlistState>,
    selected: Mutex<Option<String>>,
    fetch_seq: AtomicU64,
    cancel: CancellationToken,
}

impl WishlistView {
    pub fn new(api: Api, user_id: &str, flags: FeatureFlags) -> Self {
        let (state, _) = watch::channel(WishlistState::default());
        Self {
            api,
            user_id: user_id.to_string(),
            flags,
            state,
            selected: Mutex::new(None),
            fetch_seq: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        }
    }

    /// Load wishlists and the active wishlist's items.
    ///
    /// With multi-wishlists off only the first wishlist the backend returns is
    /// kept. Failures are stored as visible error state and returned.
    pub async fn fetch(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let seq = self.fetch_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_modify(|state| state.loading = true);

        let result = run_until_cancelled(&self.cancel, self.load()).await;
        if matches!(result, Err(Error::Cancelled)) {
            return Err(Error::Cancelled);
        }
        if self.fetch_seq.load(Ordering::SeqCst) != seq {
            debug!(user_id = %self.user_id, "fetch superseded by a newer one");
            return result.map(|_| ());
        }

        match result {
            Ok(loaded) => {
                self.state.send_modify(|state| {
                    state.wishlists = loaded.wishlists;
                    state.active_wishlist_id = loaded.active_wishlist_id;
                    state.items = loaded.items;
                    state.loading = false;
                    state.error = None;
                    state.revision += 1;
                });
                Ok(())
            }
            Err(e) => {
                warn!(user_id = %self.user_id, error = %e, "failed to fetch wishlists");
                let view_error = ViewError::from(&e);
                self.state.send_modify(|state| {
                    state.loading = false;
                    state.error = Some(view_error);
                });
                Err(e)
            }
        }
    }

    pub async fn refetch(&self) -> Result<()> {
        self.fetch().await
    }

    /// Make `wishlist_id` the active wishlist and load its items
    pub async fn select_wishlist(&self, wishlist_id: &str) -> Result<()> {
        *self.selected.lock().unwrap_or_else(|p| p.into_inner()) = Some(wishlist_id.to_string());
        self.fetch().await
    }

    /// Stop in-flight fetches; nothing is written afterwards
    pub fn teardown(&self) {
        self.cancel.cancel();
    }

    /// Apply `edit` to the item list
    pub fn update_items(&self, edit: impl FnOnce(&mut Vec<WishlistItem>)) -> Option<LocalEdit> {
        self.edit(Guard::Always, |items| {
            edit(items);
            true
        })
    }

    /// Apply `edit` only if nothing was written since `revision`
    pub fn update_items_if(
        &self,
        revision: u64,
        edit: impl FnOnce(&mut Vec<WishlistItem>),
    ) -> Option<LocalEdit> {
        self.edit(Guard::Revision(revision), |items| {
            edit(items);
            true
        })
    }

    /// Apply `edit` unless another local edit followed `after`. A fetch that
    /// replaced the items in between does not count.
    pub fn update_items_unless_edited(
        &self,
        after: &LocalEdit,
        edit: impl FnOnce(&mut Vec<WishlistItem>),
    ) -> Option<LocalEdit> {
        self.edit(Guard::LocalEdits(after.local_edits), |items| {
            edit(items);
            true
        })
    }

    /// Whether another local edit followed `after`
    pub fn edited_since(&self, after: &LocalEdit) -> bool {
        self.state.borrow().local_edits != after.local_edits
    }

    /// Patch one item in place. `None` if it is not in the list.
    pub fn patch_item(&self, item_id: &str, patch: impl FnOnce(&mut WishlistItem)) -> Option<LocalEdit> {
        self.edit(Guard::Always, |items| match items.iter_mut().find(|i| i.id == item_id) {
            Some(item) => {
                patch(item);
                true
            }
            None => false,
        })
    }

    pub fn remove_item(&self, item_id: &str) -> Option<LocalEdit> {
        self.edit(Guard::Always, |items| {
            let before = items.len();
            items.retain(|i| i.id != item_id);
            items.len() != before
        })
    }

    /// Insert or replace `item`, keeping pinned items first
    pub fn insert_item(&self, item: WishlistItem) -> Option<LocalEdit> {
        self.edit(Guard::Always, |items| {
            match items.iter_mut().find(|i| i.id == item.id) {
                Some(existing) => *existing = item,
                None => items.push(item),
            }
            sort_pinned_first(items);
            true
        })
    }

    /// Replace the list as is, without re-sorting
    pub fn replace_items(&self, items: Vec<WishlistItem>) -> Option<LocalEdit> {
        self.edit(Guard::Always, |current| {
            *current = items;
            true
        })
    }

    pub fn state(&self) -> WishlistState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WishlistState> {
        self.state.subscribe()
    }

    pub fn items(&self) -> Vec<WishlistItem> {
        self.state.borrow().items.clone()
    }

    pub fn item(&self, item_id: &str) -> Option<WishlistItem> {
        self.state.borrow().items.iter().find(|i| i.id == item_id).cloned()
    }

    pub fn item_ids(&self) -> Vec<String> {
        self.state.borrow().items.iter().map(|i| i.id.clone()).collect()
    }

    pub fn wishlists(&self) -> Vec<WishlistSummary> {
        self.state.borrow().wishlists.clone()
    }

    pub fn active_wishlist_id(&self) -> Option<String> {
        self.state.borrow().active_wishlist_id.clone()
    }

    pub fn revision(&self) -> u64 {
        self.state.borrow().revision
    }

    pub fn loading(&self) -> bool {
        self.state.borrow().loading
    }

    pub fn error(&self) -> Option<ViewError> {
        self.state.borrow().error.clone()
    }

    pub fn flags(&self) -> FeatureFlags {
        self.flags
    }

    pub(crate) fn api(&self) -> &Api {
        &self.api
    }

    pub(crate) fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn edit(
        &self,
        guard: Guard,
        edit: impl FnOnce(&mut Vec<WishlistItem>) -> bool,
    ) -> Option<LocalEdit> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let mut applied = None;
        self.state.send_if_modified(|state| {
            let allowed = match guard {
                Guard::Always => true,
                Guard::Revision(revision) => revision == state.revision,
                Guard::LocalEdits(count) => count == state.local_edits,
            };
            if !allowed {
                return false;
            }
            let previous = state.items.clone();
            if !edit(&mut state.items) {
                return false;
            }
            state.revision += 1;
            state.local_edits += 1;
            applied = Some(LocalEdit {
                previous,
                revision: state.revision,
                local_edits: state.local_edits,
            });
            true
        });
        applied
    }

    async fn load(&self) -> Result<Loaded> {
        let rows = self.api.wishlists().get_by_user_id(&self.user_id).await?;
        let mut wishlists: Vec<WishlistSummary> = rows.iter().map(WishlistSummary::from).collect();
        if !self.flags.multi_wishlists {
            wishlists.truncate(1);
        }

        let selected = self.selected.lock().unwrap_or_else(|p| p.into_inner()).clone();
        let active_wishlist_id = selected
            .filter(|id| wishlists.iter().any(|w| &w.id == id))
            .or_else(|| wishlists.first().map(|w| w.id.clone()));

        let items = match &active_wishlist_id {
            Some(wishlist_id) => {
                let mut items = self.api.items().get_by_wishlist_id(wishlist_id).await?;
                sort_pinned_first(&mut items);
                items
            }
            None => Vec::new(),
        };

        Ok(Loaded {
            wishlists,
            active_wishlist_id,
            items,
        })
    }
}

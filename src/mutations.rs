//! Optimistic mutation orchestrator
//!
//! [`ItemActions`] runs pin, delete, update and reorder against a
//! [`WishlistView`]. With [`MutationStrategy::Rollback`] the view is patched
//! before the request and repaired precisely afterwards:
//!
//! | outcome | untouched since | refetched since | newer local edit |
//! |---|---|---|---|
//! | success | reconcile with the server result | reconcile on top of the fetch | keep the newer edit |
//! | failure | restore the exact snapshot | keep the fetched state | refetch |
//!
//! [`MutationStrategy::Refetch`] leaves the view alone until the request has
//! settled and then refetches, whether it succeeded or not.
//!
//! [`FollowToggle`] always flips first and rolls back on failure.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::Api;
use crate::cancel::run_until_cancelled;
use crate::config::MutationStrategy;
use crate::error::{Error, Result};
use crate::models::{apply_order, sort_pinned_first, ItemUpdate, WishlistItem};
use crate::validation::{Validate, ValidationError};
use crate::wishlist_view::{LocalEdit, WishlistView};

/// Item mutations for one wishlist view
pub struct ItemActions {
    view: Arc<WishlistView>,
    strategy: MutationStrategy,
}

impl ItemActions {
    pub fn new(view: Arc<WishlistView>, strategy: MutationStrategy) -> Self {
        Self { view, strategy }
    }

    pub fn view(&self) -> &Arc<WishlistView> {
        &self.view
    }

    pub fn strategy(&self) -> MutationStrategy {
        self.strategy
    }

    /// Flip the item between pending and pinned.
    ///
    /// The backend performs the flip atomically. In rollback mode the list
    /// is regrouped pinned-first and the new ranks are persisted too.
    pub async fn toggle_pin(&self, item: &WishlistItem) -> Result<()> {
        let api = self.view.api();
        match self.strategy {
            MutationStrategy::Refetch => self.then_refetch(api.items().toggle_pin(&item.id)).await,
            MutationStrategy::Rollback => self.toggle_pin_optimistic(item).await,
        }
    }

    pub async fn delete(&self, item: &WishlistItem) -> Result<()> {
        let api = self.view.api();
        if self.strategy == MutationStrategy::Refetch {
            return self.then_refetch(api.items().delete(&item.id)).await;
        }

        let item_id = item.id.clone();
        let edit = self.local(|items| items.retain(|i| i.id != item_id))?;
        let result = run_until_cancelled(self.cancel(), api.items().delete(&item.id)).await;
        self.settle(edit, result, |items, ()| items.retain(|i| i.id != item_id))
            .await?;
        info!(item_id = %item.id, "item deleted");
        Ok(())
    }

    pub async fn update(&self, item_id: &str, update: &ItemUpdate) -> Result<()> {
        update.validate()?;
        let api = self.view.api();
        if self.strategy == MutationStrategy::Refetch {
            return self.then_refetch(api.items().update(item_id, update)).await;
        }

        let edit = self.local(|items| {
            if let Some(item) = items.iter_mut().find(|i| i.id == item_id) {
                item.apply(update);
            }
        })?;
        let result = run_until_cancelled(self.cancel(), api.items().update(item_id, update)).await;
        self.settle(edit, result, |items, row: WishlistItem| {
            if let Some(item) = items.iter_mut().find(|i| i.id == row.id) {
                item.name = row.name;
                item.url = row.url;
                item.description = row.description;
            }
        })
        .await?;
        Ok(())
    }

    /// Persist the given order for the active wishlist. Pinned items are not
    /// regrouped.
    pub async fn reorder(&self, ordered_ids: &[String]) -> Result<()> {
        let wishlist_id = self
            .view
            .active_wishlist_id()
            .ok_or_else(|| ValidationError::new("wishlist_id", "no active wishlist"))?;
        let api = self.view.api();
        if self.strategy == MutationStrategy::Refetch {
            return self.then_refetch(api.items().reorder(&wishlist_id, ordered_ids)).await;
        }

        let edit = self.local(|items| apply_order(items, ordered_ids))?;
        let result =
            run_until_cancelled(self.cancel(), api.items().reorder(&wishlist_id, ordered_ids)).await;
        self.settle(edit, result, |items, ()| apply_order(items, ordered_ids))
            .await?;
        Ok(())
    }

    async fn toggle_pin_optimistic(&self, item: &WishlistItem) -> Result<()> {
        let api = self.view.api();
        let edit = self.local(|items| {
            if let Some(current) = items.iter_mut().find(|i| i.id == item.id) {
                current.status = current.status.toggled();
            }
            regroup(items);
        })?;

        let result = run_until_cancelled(self.cancel(), api.items().toggle_pin(&item.id)).await;
        let latest = self
            .settle(edit, result, |items, row: WishlistItem| {
                if let Some(current) = items.iter_mut().find(|i| i.id == row.id) {
                    if current.status != row.status {
                        debug!(item_id = %row.id, "local pin state differs from server; regrouping");
                        current.status = row.status;
                    }
                }
                regroup(items);
            })
            .await?;
        if !latest {
            return Ok(());
        }

        let ordered_ids = self.view.item_ids();
        let persisted = run_until_cancelled(
            self.cancel(),
            api.items().reorder(&item.wishlist_id, &ordered_ids),
        )
        .await;
        match persisted {
            Ok(()) => Ok(()),
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                warn!(item_id = %item.id, error = %e, "failed to persist order after pin");
                self.repair().await;
                Err(e)
            }
        }
    }

    fn local(&self, edit: impl FnOnce(&mut Vec<WishlistItem>)) -> Result<LocalEdit> {
        self.view.update_items(edit).ok_or(Error::Cancelled)
    }

    /// Reconcile or repair after the request settled. `Ok(true)` when the
    /// server result was applied.
    ///
    /// `reconcile` may run on top of a fetch that replaced the optimistic
    /// edit, so it has to reapply the change rather than assume it is there.
    async fn settle<T>(
        &self,
        edit: LocalEdit,
        result: Result<T>,
        reconcile: impl FnOnce(&mut Vec<WishlistItem>, T),
    ) -> Result<bool> {
        match result {
            Ok(value) => {
                let applied = self
                    .view
                    .update_items_unless_edited(&edit, |items| reconcile(items, value))
                    .is_some();
                if !applied {
                    debug!("newer local edit in place; skipping reconcile");
                }
                Ok(applied)
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                warn!(error = %e, "mutation failed");
                let previous = edit.previous.clone();
                let restored = self
                    .view
                    .update_items_if(edit.revision, |items| *items = previous)
                    .is_some();
                if restored {
                    return Err(e);
                }
                if self.view.edited_since(&edit) {
                    debug!("newer local edit in place; refetching instead of rolling back");
                    self.repair().await;
                } else {
                    debug!("refetched while in flight; keeping the fetched items");
                }
                Err(e)
            }
        }
    }

    async fn then_refetch<T>(&self, request: impl Future<Output = Result<T>>) -> Result<()> {
        let result = run_until_cancelled(self.cancel(), request).await;
        if let Err(e) = &result {
            if e.is_cancelled() {
                return Err(Error::Cancelled);
            }
            warn!(error = %e, "mutation failed; refetching");
        }
        let refetched = self.view.refetch().await;
        result?;
        refetched
    }

    async fn repair(&self) {
        if let Err(e) = self.view.refetch().await {
            warn!(error = %e, "refetch after failed mutation failed");
        }
    }

    fn cancel(&self) -> &CancellationToken {
        self.view.cancellation_token()
    }
}

/// Pinned first, then renumber ranks to match positions
fn regroup(items: &mut [WishlistItem]) {
    sort_pinned_first(items);
    for (rank, item) in items.iter_mut().enumerate() {
        item.order = rank as i64;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FollowState {
    pub is_following: bool,
    /// A request is in flight
    pub pending: bool,
}

/// Follow button state for one target user
pub struct FollowToggle {
    api: Api,
    target_user_id: String,
    state: watch::Sender<FollowState>,
    cancel: CancellationToken,
}

impl FollowToggle {
    pub fn new(api: Api, target_user_id: &str) -> Self {
        let (state, _) = watch::channel(FollowState::default());
        Self {
            api,
            target_user_id: target_user_id.to_string(),
            state,
            cancel: CancellationToken::new(),
        }
    }

    /// Start from a known value instead of calling [`FollowToggle::load`]
    pub fn with_initial(self, is_following: bool) -> Self {
        self.state.send_modify(|s| s.is_following = is_following);
        self
    }

    /// Read the current relationship from the backend
    pub async fn load(&self) -> Result<bool> {
        let viewer = self.api.current_user_id()?;
        let follows = self.api.follows();
        let is_following = run_until_cancelled(
            &self.cancel,
            follows.is_following(&viewer, &self.target_user_id),
        )
        .await?;
        self.state.send_modify(|s| s.is_following = is_following);
        Ok(is_following)
    }

    /// Flip immediately, then follow or unfollow; the flip is undone when the
    /// request fails. Returns the new value.
    pub async fn toggle(&self) -> Result<bool> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let mut before = false;
        self.state.send_modify(|s| {
            before = s.is_following;
            s.is_following = !before;
            s.pending = true;
        });

        let follows = self.api.follows();
        let result = if before {
            run_until_cancelled(&self.cancel, follows.delete(&self.target_user_id)).await
        } else {
            run_until_cancelled(&self.cancel, async {
                follows.create(&self.target_user_id).await.map(|_| ())
            })
            .await
        };

        match result {
            Ok(()) => {
                self.state.send_modify(|s| s.pending = false);
                info!(target_user_id = %self.target_user_id, following = !before, "follow updated");
                Ok(!before)
            }
            Err(e) => {
                if !e.is_cancelled() {
                    warn!(target_user_id = %self.target_user_id, error = %e, "follow update failed; rolling back");
                }
                self.state.send_modify(|s| {
                    if s.is_following == !before {
                        s.is_following = before;
                    }
                    s.pending = false;
                });
                Err(e)
            }
        }
    }

    pub fn is_following(&self) -> bool {
        self.state.borrow().is_following
    }

    pub fn state(&self) -> FollowState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<FollowState> {
        self.state.subscribe()
    }

    pub fn teardown(&self) {
        self.cancel.cancel();
    }
}

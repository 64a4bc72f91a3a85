//! Access gate for the shared wishlist view
//!
//! A viewer sees another user's wishlist when it is their own, or when they
//! hold a share token valid for that specific wishlist. Denied checks carry
//! no content, and a missing wishlist looks the same as a forbidden one.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::Api;
use crate::cancel::run_until_cancelled;
use crate::error::{Error, ErrorKind, Result};
use crate::models::{sort_pinned_first, Profile, Wishlist, WishlistItem};

/// Result of an access check
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccessCheck {
    pub has_access: bool,
    pub profile: Option<Profile>,
    pub wishlists: Vec<Wishlist>,
    /// Items of the wishlist being shown, pinned first
    pub wishlist_items: Vec<WishlistItem>,
}

impl AccessCheck {
    pub fn denied() -> Self {
        Self::default()
    }
}

/// What the gate has to do for a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision<'a> {
    /// The viewer is looking at their own profile
    Owner,
    /// Grant iff `token` is valid for `wishlist_id`
    ValidateToken { wishlist_id: &'a str, token: &'a str },
    Denied,
}

/// Decide without touching the network. Blank ids and tokens count as absent.
pub fn decide<'a>(
    viewer_id: Option<&str>,
    target_user_id: &str,
    wishlist_id: Option<&'a str>,
    share_token: Option<&'a str>,
) -> Decision<'a> {
    if present(viewer_id).is_some() && viewer_id == Some(target_user_id) {
        return Decision::Owner;
    }
    match (present(wishlist_id), present(share_token)) {
        (Some(wishlist_id), Some(token)) => Decision::ValidateToken { wishlist_id, token },
        _ => Decision::Denied,
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

pub struct AccessGate {
    api: Api,
    cancel: CancellationToken,
}

impl AccessGate {
    pub fn new(api: Api) -> Self {
        Self {
            api,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Decide access and load what the viewer may see.
    ///
    /// Own profiles get every wishlist, with the items of `wishlist_id` (or
    /// of the first wishlist). A valid share token gets that one wishlist.
    pub async fn check(
        &self,
        viewer_id: Option<&str>,
        target_user_id: &str,
        wishlist_id: Option<&str>,
        share_token: Option<&str>,
    ) -> Result<AccessCheck> {
        let decision = decide(viewer_id, target_user_id, wishlist_id, share_token);
        debug!(target_user_id, ?decision, "access decision");

        match decision {
            Decision::Owner => {
                run_until_cancelled(&self.cancel, self.load_own(target_user_id, wishlist_id)).await
            }
            Decision::ValidateToken { wishlist_id, token } => {
                let loaded = run_until_cancelled(
                    &self.cancel,
                    self.load_shared(target_user_id, wishlist_id, token),
                )
                .await;
                match loaded {
                    Ok(check) => {
                        if !check.has_access {
                            info!(target_user_id, "access denied");
                        }
                        Ok(check)
                    }
                    Err(e) if hides_existence(&e) => {
                        info!(target_user_id, kind = ?e.kind(), "access denied");
                        Ok(AccessCheck::denied())
                    }
                    Err(e) => Err(e),
                }
            }
            Decision::Denied => {
                info!(target_user_id, "access denied");
                Ok(AccessCheck::denied())
            }
        }
    }

    async fn load_own(&self, user_id: &str, wishlist_id: Option<&str>) -> Result<AccessCheck> {
        let profile = match self.api.profiles().get_by_id(user_id).await {
            Ok(profile) => Some(profile),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        let wishlists = self.api.wishlists().get_by_user_id(user_id).await?;

        let shown = wishlist_id
            .and_then(|id| wishlists.iter().find(|w| w.id == id))
            .or_else(|| wishlists.first())
            .map(|w| w.id.clone());
        let wishlist_items = match shown {
            Some(id) => self.items_of(&id).await?,
            None => Vec::new(),
        };

        Ok(AccessCheck {
            has_access: true,
            profile,
            wishlists,
            wishlist_items,
        })
    }

    async fn load_shared(
        &self,
        target_user_id: &str,
        wishlist_id: &str,
        token: &str,
    ) -> Result<AccessCheck> {
        if !self.api.share_tokens().validate_for(wishlist_id, token).await? {
            return Ok(AccessCheck::denied());
        }

        let wishlist = self.api.wishlists().get_by_id(wishlist_id).await?;
        if wishlist.user_id != target_user_id {
            debug!(wishlist_id, target_user_id, "token is for another user's wishlist");
            return Ok(AccessCheck::denied());
        }

        let profile = self.api.profiles().get_by_id(target_user_id).await?;
        let wishlist_items = self.items_of(wishlist_id).await?;
        Ok(AccessCheck {
            has_access: true,
            profile: Some(profile),
            wishlists: vec![wishlist],
            wishlist_items,
        })
    }

    async fn items_of(&self, wishlist_id: &str) -> Result<Vec<WishlistItem>> {
        let mut items = self.api.items().get_by_wishlist_id(wishlist_id).await?;
        sort_pinned_first(&mut items);
        Ok(items)
    }
}

/// Failures reported to the viewer as a plain denial
fn hides_existence(error: &Error) -> bool {
    matches!(
        error.kind(),
        ErrorKind::NoRows | ErrorKind::InsufficientPrivilege
    )
}

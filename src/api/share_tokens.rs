use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use super::{first_row, Api, SHARE_TOKENS};
use crate::error::{ErrorKind, Result};
use crate::models::ShareToken;
use crate::validation;

const VALIDATE_FN: &str = "validate_share_token";

/// Share link tokens, one per wishlist
pub struct ShareTokens<'a> {
    api: &'a Api,
}

impl<'a> ShareTokens<'a> {
    pub(crate) fn new(api: &'a Api) -> Self {
        Self { api }
    }

    pub async fn get_or_create(&self, wishlist_id: &str) -> Result<ShareToken> {
        validation::required("wishlist_id", wishlist_id, 64)?;
        match self.get(wishlist_id).await {
            Err(e) if e.is_not_found() => {}
            other => return other,
        }

        match self.insert(wishlist_id).await {
            // Lost a race with another device creating the token
            Err(e) if e.kind() == ErrorKind::UniqueViolation => self.get(wishlist_id).await,
            other => other,
        }
    }

    /// Replace the token, invalidating links shared so far
    pub async fn regenerate(&self, wishlist_id: &str) -> Result<ShareToken> {
        validation::required("wishlist_id", wishlist_id, 64)?;
        let rows = self
            .api
            .from(SHARE_TOKENS)?
            .eq("wishlist_id", wishlist_id)
            .update::<_, ShareToken>(json!({
                "token": new_token(),
                "access_count": 0,
                "last_accessed_at": null,
            }))
            .await?;
        match rows.into_iter().next() {
            Some(token) => {
                info!(wishlist_id, "share token regenerated");
                Ok(token)
            }
            None => self.insert(wishlist_id).await,
        }
    }

    /// True iff `token` grants access to this specific wishlist
    pub async fn validate_for(&self, wishlist_id: &str, token: &str) -> Result<bool> {
        validation::required("wishlist_id", wishlist_id, 64)?;
        if token.trim().is_empty() {
            return Ok(false);
        }
        let valid = self
            .api
            .rpc(
                VALIDATE_FN,
                json!({ "wishlist_id": wishlist_id, "token": token }),
            )?
            .call_rpc::<Option<bool>>()
            .await?
            .unwrap_or(false);
        debug!(wishlist_id, valid, "share token checked");
        Ok(valid)
    }

    async fn get(&self, wishlist_id: &str) -> Result<ShareToken> {
        Ok(self
            .api
            .from(SHARE_TOKENS)?
            .select("*")
            .eq("wishlist_id", wishlist_id)
            .execute_single()
            .await?)
    }

    async fn insert(&self, wishlist_id: &str) -> Result<ShareToken> {
        let rows = self
            .api
            .from(SHARE_TOKENS)?
            .insert::<_, ShareToken>(json!({
                "wishlist_id": wishlist_id,
                "token": new_token(),
            }))
            .await?;
        first_row(rows, "created share token")
    }
}

fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}

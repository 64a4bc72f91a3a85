use std::collections::HashSet;

use giftful_postgrest::SortOrder;
use serde_json::{json, Value};
use tracing::debug;

use super::{first_row, Api, WISHLIST_ITEMS};
use crate::error::Result;
use crate::models::{ItemUpdate, NewItem, WishlistItem};
use crate::validation::{self, Validate, ValidationError};

const REORDER_FN: &str = "reorder_wishlist_items";
const TOGGLE_PIN_FN: &str = "toggle_item_pin";

/// Wishlist item queries
pub struct Items<'a> {
    api: &'a Api,
}

impl<'a> Items<'a> {
    pub(crate) fn new(api: &'a Api) -> Self {
        Self { api }
    }

    pub async fn create(&self, item: &NewItem) -> Result<WishlistItem> {
        item.validate()?;
        let rows = self
            .api
            .from(WISHLIST_ITEMS)?
            .insert::<_, WishlistItem>(item)
            .await?;
        first_row(rows, "created item")
    }

    pub async fn get_by_id(&self, id: &str) -> Result<WishlistItem> {
        validation::required("id", id, 64)?;
        Ok(self
            .api
            .from(WISHLIST_ITEMS)?
            .select("*")
            .eq("id", id)
            .execute_single()
            .await?)
    }

    /// Items of a wishlist by rank. Pinned items are not grouped here.
    pub async fn get_by_wishlist_id(&self, wishlist_id: &str) -> Result<Vec<WishlistItem>> {
        validation::required("wishlist_id", wishlist_id, 64)?;
        Ok(self
            .api
            .from(WISHLIST_ITEMS)?
            .select("*")
            .eq("wishlist_id", wishlist_id)
            .order("order", SortOrder::Ascending)
            .execute()
            .await?)
    }

    pub async fn update(&self, id: &str, update: &ItemUpdate) -> Result<WishlistItem> {
        validation::required("id", id, 64)?;
        update.validate()?;
        let rows = self
            .api
            .from(WISHLIST_ITEMS)?
            .eq("id", id)
            .update::<_, WishlistItem>(update)
            .await?;
        first_row(rows, format!("item {}", id).as_str())
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        validation::required("id", id, 64)?;
        Ok(self.api.from(WISHLIST_ITEMS)?.eq("id", id).delete().await?)
    }

    /// Persist ranks so that `ordered_ids[n]` gets rank `n`
    pub async fn reorder(&self, wishlist_id: &str, ordered_ids: &[String]) -> Result<()> {
        validation::required("wishlist_id", wishlist_id, 64)?;
        let mut seen = HashSet::new();
        for id in ordered_ids {
            validation::required("item_ids", id, 64)?;
            if !seen.insert(id.as_str()) {
                return Err(ValidationError::new("item_ids", format!("duplicate id {}", id)).into());
            }
        }
        if ordered_ids.is_empty() {
            return Ok(());
        }

        let params = json!({
            "wishlist_id": wishlist_id,
            "item_ids": ordered_ids,
        });
        self.api.rpc(REORDER_FN, params)?.call_rpc::<Value>().await?;
        debug!(wishlist_id, count = ordered_ids.len(), "items reordered");
        Ok(())
    }

    /// Flip `pending`/`pinned` in one server-side step and return the row
    pub async fn toggle_pin(&self, id: &str) -> Result<WishlistItem> {
        validation::required("item_id", id, 64)?;
        let item = self
            .api
            .rpc(TOGGLE_PIN_FN, json!({ "item_id": id }))?
            .call_rpc::<WishlistItem>()
            .await?;
        debug!(item_id = id, status = ?item.status, "pin toggled");
        Ok(item)
    }
}

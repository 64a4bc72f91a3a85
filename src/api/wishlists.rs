use super::{first_row, Api, WISHLISTS};
use crate::error::Result;
use crate::models::{NewWishlist, Wishlist, WishlistUpdate};
use crate::validation::{self, Validate};

/// Wishlist queries
pub struct Wishlists<'a> {
    api: &'a Api,
}

impl<'a> Wishlists<'a> {
    pub(crate) fn new(api: &'a Api) -> Self {
        Self { api }
    }

    pub async fn create(&self, wishlist: &NewWishlist) -> Result<Wishlist> {
        wishlist.validate()?;
        let rows = self
            .api
            .from(WISHLISTS)?
            .insert::<_, Wishlist>(wishlist)
            .await?;
        first_row(rows, "created wishlist")
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Wishlist> {
        validation::required("id", id, 64)?;
        Ok(self
            .api
            .from(WISHLISTS)?
            .select("*")
            .eq("id", id)
            .execute_single()
            .await?)
    }

    /// All wishlists of a user, in the order the backend returns them
    pub async fn get_by_user_id(&self, user_id: &str) -> Result<Vec<Wishlist>> {
        validation::required("user_id", user_id, 64)?;
        Ok(self
            .api
            .from(WISHLISTS)?
            .select("*")
            .eq("user_id", user_id)
            .execute()
            .await?)
    }

    pub async fn update(&self, id: &str, update: &WishlistUpdate) -> Result<Wishlist> {
        validation::required("id", id, 64)?;
        update.validate()?;
        let rows = self
            .api
            .from(WISHLISTS)?
            .eq("id", id)
            .update::<_, Wishlist>(update)
            .await?;
        first_row(rows, format!("wishlist {}", id).as_str())
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        validation::required("id", id, 64)?;
        Ok(self.api.from(WISHLISTS)?.eq("id", id).delete().await?)
    }
}

use super::{first_row, Api, FOLLOWS, PROFILES};
use crate::error::Result;
use crate::models::{Follow, Profile};
use crate::validation::{self, Validate};

/// Follow relationships
pub struct Follows<'a> {
    api: &'a Api,
}

impl<'a> Follows<'a> {
    pub(crate) fn new(api: &'a Api) -> Self {
        Self { api }
    }

    /// Follow `following_id` as the signed-in user
    pub async fn create(&self, following_id: &str) -> Result<Follow> {
        let follow = Follow {
            follower_id: self.api.current_user_id()?,
            following_id: following_id.to_string(),
        };
        follow.validate()?;
        let rows = self.api.from(FOLLOWS)?.insert::<_, Follow>(&follow).await?;
        first_row(rows, "created follow")
    }

    /// Unfollow `following_id` as the signed-in user
    pub async fn delete(&self, following_id: &str) -> Result<()> {
        let follower_id = self.api.current_user_id()?;
        validation::required("following_id", following_id, 64)?;
        Ok(self
            .api
            .from(FOLLOWS)?
            .eq("follower_id", &follower_id)
            .eq("following_id", following_id)
            .delete()
            .await?)
    }

    pub async fn is_following(&self, follower_id: &str, following_id: &str) -> Result<bool> {
        validation::required("follower_id", follower_id, 64)?;
        validation::required("following_id", following_id, 64)?;
        let rows = self
            .api
            .from(FOLLOWS)?
            .select("follower_id,following_id")
            .eq("follower_id", follower_id)
            .eq("following_id", following_id)
            .limit(1)
            .execute::<Follow>()
            .await?;
        Ok(!rows.is_empty())
    }

    /// Profiles `user_id` follows
    pub async fn get_following(&self, user_id: &str) -> Result<Vec<Profile>> {
        validation::required("user_id", user_id, 64)?;
        let edges = self
            .api
            .from(FOLLOWS)?
            .select("follower_id,following_id")
            .eq("follower_id", user_id)
            .execute::<Follow>()
            .await?;
        let ids: Vec<&str> = edges.iter().map(|f| f.following_id.as_str()).collect();
        self.profiles_in(&ids).await
    }

    /// Profiles following `user_id`
    pub async fn get_followers(&self, user_id: &str) -> Result<Vec<Profile>> {
        validation::required("user_id", user_id, 64)?;
        let edges = self
            .api
            .from(FOLLOWS)?
            .select("follower_id,following_id")
            .eq("following_id", user_id)
            .execute::<Follow>()
            .await?;
        let ids: Vec<&str> = edges.iter().map(|f| f.follower_id.as_str()).collect();
        self.profiles_in(&ids).await
    }

    async fn profiles_in(&self, ids: &[&str]) -> Result<Vec<Profile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .api
            .from(PROFILES)?
            .select("*")
            .in_list("id", ids)
            .execute()
            .await?)
    }
}

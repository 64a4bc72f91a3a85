use tracing::debug;

use super::{first_row, Api, PROFILES};
use crate::error::Result;
use crate::models::{NewProfile, Profile, ProfileUpdate};
use crate::validation::{self, Validate};

const SEARCH_LIMIT: u32 = 20;

/// Profile queries
pub struct Profiles<'a> {
    api: &'a Api,
}

impl<'a> Profiles<'a> {
    pub(crate) fn new(api: &'a Api) -> Self {
        Self { api }
    }

    pub async fn create(&self, profile: &NewProfile) -> Result<Profile> {
        profile.validate()?;
        let rows = self
            .api
            .from(PROFILES)?
            .insert::<_, Profile>(profile)
            .await?;
        debug!(user_id = %profile.id, "profile created");
        first_row(rows, "created profile")
    }

    /// Fails with [`ErrorKind::NoRows`](crate::ErrorKind::NoRows) when the
    /// user has not completed onboarding yet.
    pub async fn get_by_id(&self, id: &str) -> Result<Profile> {
        validation::required("id", id, 64)?;
        Ok(self
            .api
            .from(PROFILES)?
            .select("*")
            .eq("id", id)
            .execute_single()
            .await?)
    }

    pub async fn update(&self, id: &str, update: &ProfileUpdate) -> Result<Profile> {
        validation::required("id", id, 64)?;
        update.validate()?;
        let rows = self
            .api
            .from(PROFILES)?
            .eq("id", id)
            .update::<_, Profile>(update)
            .await?;
        first_row(rows, format!("profile {}", id).as_str())
    }

    /// Case-insensitive name search
    pub async fn search_by_name(&self, query: &str) -> Result<Vec<Profile>> {
        let query = query.trim();
        validation::required("query", query, 100)?;
        let pattern = format!("*{}*", query.replace(['*', ',', '(', ')'], ""));
        Ok(self
            .api
            .from(PROFILES)?
            .select("*")
            .ilike("name", &pattern)
            .limit(SEARCH_LIMIT)
            .execute()
            .await?)
    }
}

use bytes::Bytes;
use mime::Mime;
use tracing::debug;
use uuid::Uuid;

use super::Api;
use crate::error::Result;
use crate::validation::{self, ValidationError};

const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;

/// Profile images in object storage. Profiles store the returned path.
pub struct Avatars<'a> {
    api: &'a Api,
}

impl<'a> Avatars<'a> {
    pub(crate) fn new(api: &'a Api) -> Self {
        Self { api }
    }

    /// Upload an image and return its object path, `{user_id}/{uuid}.{ext}`
    pub async fn upload(&self, user_id: &str, data: Vec<u8>, content_type: &str) -> Result<String> {
        validation::required("user_id", user_id, 64)?;
        let media_type: Mime = content_type
            .parse()
            .map_err(|_| ValidationError::new("content_type", "not a mime type"))?;
        if media_type.type_() != mime::IMAGE {
            return Err(ValidationError::new("content_type", "only images can be uploaded").into());
        }
        if data.is_empty() {
            return Err(ValidationError::new("data", "must not be empty").into());
        }
        if data.len() > MAX_AVATAR_BYTES {
            return Err(ValidationError::new("data", "image is larger than 5 MiB").into());
        }

        let path = format!("{}/{}.{}", user_id, Uuid::new_v4(), extension(&media_type));
        self.api
            .storage()
            .from(self.api.avatar_bucket())
            .upload_bytes(&path, data, media_type.essence_str(), false)
            .await?;
        debug!(user_id, path = %path, "avatar uploaded");
        Ok(path)
    }

    pub async fn fetch(&self, path: &str) -> Result<Bytes> {
        validation::required("path", path, 256)?;
        Ok(self
            .api
            .storage()
            .from(self.api.avatar_bucket())
            .download(path)
            .await?)
    }

    /// Delete a previously uploaded avatar, e.g. after it was replaced
    pub async fn remove(&self, path: &str) -> Result<()> {
        validation::required("path", path, 256)?;
        self.api
            .storage()
            .from(self.api.avatar_bucket())
            .remove(&[path])
            .await?;
        debug!(path, "avatar removed");
        Ok(())
    }

    pub fn public_url(&self, path: &str) -> String {
        self.api
            .storage()
            .from(self.api.avatar_bucket())
            .get_public_url(path)
    }
}

fn extension(media_type: &Mime) -> &str {
    match media_type.subtype().as_str() {
        "jpeg" => "jpg",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_from_mime() {
        assert_eq!(extension(&mime::IMAGE_JPEG), "jpg");
        assert_eq!(extension(&mime::IMAGE_PNG), "png");
        assert_eq!(extension(&"image/svg+xml".parse().unwrap()), "svg");
    }
}

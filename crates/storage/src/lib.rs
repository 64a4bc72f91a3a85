//! Giftful storage client
//!
//! Uploads and downloads objects in a storage bucket. Giftful keeps profile
//! avatars and backgrounds here and stores only the object path on the
//! profile row.

use bytes::Bytes;
use log::debug;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use url::Url;

pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors produced by the storage client
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("API error: {message} (Status: {status})")]
    ApiError { status: StatusCode, message: String },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),
}

impl StorageError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            StorageError::ApiError { status, .. } => Some(*status),
            StorageError::NetworkError(e) => e.status(),
            _ => None,
        }
    }
}

/// Upload response
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedObject {
    /// `bucket/path` of the stored object
    #[serde(rename = "Key")]
    pub key: String,
}

/// Storage client
#[derive(Debug, Clone)]
pub struct StorageClient {
    base_url: String,
    api_key: String,
    http_client: Client,
    access_token: Option<String>,
}

/// Client scoped to one bucket
pub struct StorageBucketClient<'a> {
    parent: &'a StorageClient,
    bucket_id: String,
}

impl StorageClient {
    pub fn new(base_url: &str, api_key: &str, http_client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http_client,
            access_token: None,
        }
    }

    /// Act as the signed-in user instead of the anonymous key
    pub fn with_auth(mut self, token: &str) -> Self {
        self.access_token = Some(token.to_string());
        self
    }

    /// Select a bucket
    pub fn from<'a>(&'a self, bucket_id: &str) -> StorageBucketClient<'a> {
        StorageBucketClient {
            parent: self,
            bucket_id: bucket_id.to_string(),
        }
    }

    fn bearer(&self) -> &str {
        self.access_token.as_deref().unwrap_or(&self.api_key)
    }

    fn object_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)?;
        let path = format!("/storage/v1/object/{}", segments.join("/"));
        url.set_path(&path);
        Ok(url)
    }
}

impl<'a> StorageBucketClient<'a> {
    /// Upload raw bytes with their mime type
    pub async fn upload_bytes(
        &self,
        path: &str,
        data: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> Result<UploadedObject> {
        let url = self.parent.object_url(&[&self.bucket_id, path])?;

        let response = self
            .parent
            .http_client
            .post(url)
            .header("apikey", &self.parent.api_key)
            .bearer_auth(self.parent.bearer())
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", upsert.to_string())
            .body(data)
            .send()
            .await?;

        let response = check(response).await?;
        debug!("Uploaded {}/{}", self.bucket_id, path);
        Ok(response.json::<UploadedObject>().await?)
    }

    /// Download an object
    pub async fn download(&self, path: &str) -> Result<Bytes> {
        let url = self.parent.object_url(&[&self.bucket_id, path])?;

        let response = self
            .parent
            .http_client
            .get(url)
            .header("apikey", &self.parent.api_key)
            .bearer_auth(self.parent.bearer())
            .send()
            .await?;

        Ok(check(response).await?.bytes().await?)
    }

    /// Delete objects
    pub async fn remove(&self, paths: &[&str]) -> Result<()> {
        let url = self.parent.object_url(&[&self.bucket_id])?;

        let response = self
            .parent
            .http_client
            .delete(url)
            .header("apikey", &self.parent.api_key)
            .bearer_auth(self.parent.bearer())
            .json(&json!({ "prefixes": paths }))
            .send()
            .await?;

        check(response).await?;
        Ok(())
    }

    /// Public URL of an object in a public bucket
    pub fn get_public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.parent.base_url, self.bucket_id, path
        )
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await?;
    Err(StorageError::ApiError { status, message })
}

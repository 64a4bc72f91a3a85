//! PostgREST client for Giftful
//!
//! A small query builder over the PostgREST HTTP API covering what the
//! Giftful data-access layer needs:
//!
//! - Table reads (`select`, `eq`, `in_list`, `ilike`, `order`, `limit`)
//! - Single-row reads that report "no rows" as a structured error
//! - `insert`, `update`, `delete` returning representations
//! - RPC function calls
//!
//! Failed responses are decoded into [`PostgrestApiErrorDetails`] so callers
//! can branch on the Postgres / PostgREST error `code`.

use log::debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use url::Url;

/// Media type asking PostgREST for exactly one object instead of an array.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// PostgREST error code for "JSON object requested, multiple (or no) rows returned".
pub const NO_ROWS_CODE: &str = "PGRST116";

/// Error body returned by PostgREST
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PostgrestApiErrorDetails {
    pub code: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
    pub hint: Option<String>,
}

impl fmt::Display for PostgrestApiErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message.as_deref().unwrap_or("unknown error"))?;
        if let Some(code) = &self.code {
            write!(f, " [{}]", code)?;
        }
        if let Some(details) = &self.details {
            write!(f, ": {}", details)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " (hint: {})", hint)?;
        }
        Ok(())
    }
}

/// Errors produced by [`PostgrestClient`]
#[derive(Error, Debug)]
pub enum PostgrestError {
    #[error("{status}: {details}")]
    ApiError {
        details: PostgrestApiErrorDetails,
        status: StatusCode,
    },

    #[error("{status}: {message}")]
    UnparsedApiError { message: String, status: StatusCode },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl PostgrestError {
    /// Postgres SQLSTATE or PostgREST error code, when the server sent one.
    pub fn code(&self) -> Option<&str> {
        match self {
            PostgrestError::ApiError { details, .. } => details.code.as_deref(),
            _ => None,
        }
    }

    /// HTTP status of the failed response, when there was one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            PostgrestError::ApiError { status, .. }
            | PostgrestError::UnparsedApiError { status, .. } => Some(*status),
            PostgrestError::NetworkError(e) => e.status(),
            _ => None,
        }
    }

    /// True when a single-row read matched nothing.
    pub fn is_no_rows(&self) -> bool {
        self.code() == Some(NO_ROWS_CODE)
    }

    fn from_response_text(status: StatusCode, text: String) -> Self {
        match serde_json::from_str::<PostgrestApiErrorDetails>(&text) {
            Ok(details) => PostgrestError::ApiError { details, status },
            Err(_) => PostgrestError::UnparsedApiError {
                message: text,
                status,
            },
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        }
    }
}

/// PostgREST client bound to one table (or one RPC function)
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    base_url: String,
    table: String,
    http_client: Client,
    headers: HeaderMap,
    query_params: Vec<(String, String)>,
    rpc_params: Option<Value>,
}

impl PostgrestClient {
    /// Create a client for `table`
    pub fn new(base_url: &str, api_key: &str, table: &str, http_client: Client) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(api_key) {
            headers.insert("apikey", value);
        }
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            table: table.to_string(),
            http_client,
            headers,
            query_params: Vec::new(),
            rpc_params: None,
        }
    }

    /// Create a client that calls the stored function `function_name`
    pub fn rpc(
        base_url: &str,
        api_key: &str,
        function_name: &str,
        params: Value,
        http_client: Client,
    ) -> Self {
        let mut client = Self::new(base_url, api_key, function_name, http_client);
        client.rpc_params = Some(params);
        client
    }

    /// Add a request header
    pub fn with_header(mut self, key: &str, value: &str) -> Result<Self, PostgrestError> {
        let header_value = HeaderValue::from_str(value).map_err(|_| {
            PostgrestError::InvalidParameters(format!("Invalid header value: {}", value))
        })?;
        let header_name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
            PostgrestError::InvalidParameters(format!("Invalid header name: {}", key))
        })?;

        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Send the user's access token so row-level security applies to them
    pub fn with_auth(self, token: &str) -> Result<Self, PostgrestError> {
        self.with_header("Authorization", &format!("Bearer {}", token))
    }

    /// Columns to return
    pub fn select(mut self, columns: &str) -> Self {
        self.set_param("select", columns.to_string());
        self
    }

    /// `column = value`
    pub fn eq(mut self, column: &str, value: &str) -> Self {
        self.push_param(column, format!("eq.{}", value));
        self
    }

    /// Case-insensitive pattern match
    pub fn ilike(mut self, column: &str, pattern: &str) -> Self {
        self.push_param(column, format!("ilike.{}", pattern));
        self
    }

    /// `column IN (values)`
    pub fn in_list(mut self, column: &str, values: &[&str]) -> Self {
        self.push_param(column, format!("in.({})", values.join(",")));
        self
    }

    /// Order results by `column`
    pub fn order(mut self, column: &str, order: SortOrder) -> Self {
        self.set_param("order", format!("{}.{}", column, order.as_str()));
        self
    }

    /// Limit the number of rows returned
    pub fn limit(mut self, count: u32) -> Self {
        self.set_param("limit", count.to_string());
        self
    }

    /// Fetch rows as a list
    pub async fn execute<T: DeserializeOwned>(&self) -> Result<Vec<T>, PostgrestError> {
        let request = self.request(Method::GET)?;
        let body = self.send(request).await?;
        decode(&body)
    }

    /// Fetch exactly one row.
    ///
    /// When nothing matches, PostgREST answers with code [`NO_ROWS_CODE`],
    /// which is surfaced as an [`PostgrestError::ApiError`].
    pub async fn execute_single<T: DeserializeOwned>(&self) -> Result<T, PostgrestError> {
        let request = self
            .request(Method::GET)?
            .header(ACCEPT, HeaderValue::from_static(SINGLE_OBJECT));
        let body = self.send(request).await?;
        decode(&body)
    }

    /// Insert rows and return their representation
    pub async fn insert<T: Serialize, R: DeserializeOwned>(
        &self,
        values: T,
    ) -> Result<Vec<R>, PostgrestError> {
        let request = self
            .request(Method::POST)?
            .header("Prefer", "return=representation")
            .json(&values);
        let body = self.send(request).await?;
        decode_rows(&body)
    }

    /// Update the filtered rows and return their new representation
    pub async fn update<T: Serialize, R: DeserializeOwned>(
        &self,
        values: T,
    ) -> Result<Vec<R>, PostgrestError> {
        let request = self
            .request(Method::PATCH)?
            .header("Prefer", "return=representation")
            .json(&values);
        let body = self.send(request).await?;
        decode_rows(&body)
    }

    /// Delete the filtered rows
    pub async fn delete(&self) -> Result<(), PostgrestError> {
        let request = self
            .request(Method::DELETE)?
            .header("Prefer", "return=minimal");
        self.send(request).await?;
        Ok(())
    }

    /// Call the RPC function this client was created for
    pub async fn call_rpc<T: DeserializeOwned>(&self) -> Result<T, PostgrestError> {
        let params = self.rpc_params.as_ref().ok_or_else(|| {
            PostgrestError::InvalidParameters(
                "Client was not created for RPC. Use PostgrestClient::rpc().".to_string(),
            )
        })?;
        let url = format!("{}/rest/v1/rpc/{}", self.base_url, self.table);
        let request = self
            .http_client
            .post(&url)
            .headers(self.headers.clone())
            .json(params);
        let body = self.send(request).await?;
        decode(&body)
    }

    fn set_param(&mut self, key: &str, value: String) {
        self.query_params.retain(|(k, _)| k != key);
        self.query_params.push((key.to_string(), value));
    }

    fn push_param(&mut self, key: &str, value: String) {
        self.query_params.push((key.to_string(), value));
    }

    fn build_url(&self) -> Result<Url, PostgrestError> {
        let mut url = Url::parse(&format!("{}/rest/v1/{}", self.base_url, self.table))?;
        if !self.query_params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query_params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method) -> Result<RequestBuilder, PostgrestError> {
        let url = self.build_url()?;
        Ok(self
            .http_client
            .request(method, url)
            .headers(self.headers.clone()))
    }

    async fn send(&self, request: RequestBuilder) -> Result<String, PostgrestError> {
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            debug!("PostgREST request on {} failed: {} {}", self.table, status, text);
            return Err(PostgrestError::from_response_text(status, text));
        }

        Ok(text)
    }
}

/// Decode a response body; an empty body (204, `return=minimal`) reads as `null`.
fn decode<T: DeserializeOwned>(body: &str) -> Result<T, PostgrestError> {
    let body = if body.trim().is_empty() { "null" } else { body };
    serde_json::from_str(body).map_err(|e| PostgrestError::DeserializationError(e.to_string()))
}

fn decode_rows<R: DeserializeOwned>(body: &str) -> Result<Vec<R>, PostgrestError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    decode(body)
}

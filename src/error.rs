//! Error handling for the Giftful client
//!
//! Every remote call returns [`Result<T, Error>`](Result). Expected failure
//! modes never panic; callers branch on [`Error::kind`] to tell a backend
//! constraint violation apart from a missing row or a denied request.

use std::fmt;

use giftful_auth::AuthError;
use giftful_postgrest::{PostgrestError, NO_ROWS_CODE};
use giftful_storage::StorageError;
use reqwest::StatusCode;
use thiserror::Error;

use crate::validation::ValidationError;

pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the Giftful client
#[derive(Error, Debug)]
pub enum Error {
    /// Input rejected before any network call
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Database error: {0}")]
    Database(#[from] PostgrestError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A single-row operation matched nothing
    #[error("No rows: {0}")]
    NoRows(String),

    #[error("Not signed in")]
    Unauthenticated,

    /// The operation was aborted through its cancellation token
    #[error("Operation cancelled")]
    Cancelled,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    General(String),
}

/// Classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UniqueViolation,
    ForeignKeyViolation,
    NotNullViolation,
    CheckViolation,
    /// Row-level security or permission denial
    InsufficientPrivilege,
    /// A single-row read found nothing
    NoRows,
    Validation,
    Unauthenticated,
    Cancelled,
    Unclassified,
}

/// Map a Postgres SQLSTATE or PostgREST code to an [`ErrorKind`]
pub fn classify_code(code: &str) -> Option<ErrorKind> {
    match code {
        "23505" => Some(ErrorKind::UniqueViolation),
        "23503" => Some(ErrorKind::ForeignKeyViolation),
        "23502" => Some(ErrorKind::NotNullViolation),
        "23514" => Some(ErrorKind::CheckViolation),
        "42501" => Some(ErrorKind::InsufficientPrivilege),
        NO_ROWS_CODE => Some(ErrorKind::NoRows),
        _ => None,
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Database(e) if e.is_no_rows() => ErrorKind::NoRows,
            Error::Database(e) => match e.code().and_then(classify_code) {
                Some(kind) => kind,
                None => kind_from_status(e.status()),
            },
            Error::Auth(e) => match e {
                AuthError::NetworkError(_)
                | AuthError::SerializationError(_)
                | AuthError::Storage(_) => ErrorKind::Unclassified,
                _ => ErrorKind::Unauthenticated,
            },
            Error::Storage(e) => match e.status() {
                Some(StatusCode::NOT_FOUND) => ErrorKind::NoRows,
                status => kind_from_status(status),
            },
            Error::NoRows(_) => ErrorKind::NoRows,
            Error::Unauthenticated => ErrorKind::Unauthenticated,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Http(_)
            | Error::Json(_)
            | Error::Config(_)
            | Error::General(_) => ErrorKind::Unclassified,
        }
    }

    /// Backend error code, when the server sent one
    pub fn code(&self) -> Option<&str> {
        match self {
            Error::Database(e) => e.code(),
            Error::Auth(AuthError::ApiError { code, .. }) => code.as_deref(),
            _ => None,
        }
    }

    /// True for a "not found" outcome, which callers treat as recoverable
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NoRows
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    pub fn general<T: fmt::Display>(msg: T) -> Self {
        Error::General(msg.to_string())
    }

    pub fn no_rows<T: fmt::Display>(what: T) -> Self {
        Error::NoRows(what.to_string())
    }
}

fn kind_from_status(status: Option<StatusCode>) -> ErrorKind {
    match status {
        Some(StatusCode::FORBIDDEN) => ErrorKind::InsufficientPrivilege,
        Some(StatusCode::UNAUTHORIZED) => ErrorKind::Unauthenticated,
        _ => ErrorKind::Unclassified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use giftful_postgrest::PostgrestApiErrorDetails;

    fn api_error(code: Option<&str>, status: StatusCode) -> Error {
        Error::Database(PostgrestError::ApiError {
            details: PostgrestApiErrorDetails {
                code: code.map(str::to_string),
                message: Some("failed".to_string()),
                details: None,
                hint: None,
            },
            status,
        })
    }

    #[test]
    fn test_known_codes_are_classified() {
        let cases = [
            ("23505", ErrorKind::UniqueViolation),
            ("23503", ErrorKind::ForeignKeyViolation),
            ("23502", ErrorKind::NotNullViolation),
            ("23514", ErrorKind::CheckViolation),
            ("42501", ErrorKind::InsufficientPrivilege),
            ("PGRST116", ErrorKind::NoRows),
        ];
        for (code, kind) in cases {
            assert_eq!(api_error(Some(code), StatusCode::CONFLICT).kind(), kind, "{}", code);
        }
    }

    #[test]
    fn test_unknown_code_passes_through() {
        let err = api_error(Some("22P02"), StatusCode::BAD_REQUEST);
        assert_eq!(err.kind(), ErrorKind::Unclassified);
        assert_eq!(err.code(), Some("22P02"));
    }

    #[test]
    fn test_forbidden_without_code_is_insufficient_privilege() {
        let err = Error::Database(PostgrestError::UnparsedApiError {
            message: "permission denied".to_string(),
            status: StatusCode::FORBIDDEN,
        });
        assert_eq!(err.kind(), ErrorKind::InsufficientPrivilege);
    }

    #[test]
    fn test_no_rows_is_not_found() {
        assert!(api_error(Some("PGRST116"), StatusCode::NOT_ACCEPTABLE).is_not_found());
        assert!(Error::no_rows("profile u1").is_not_found());
        assert!(!Error::Cancelled.is_not_found());
    }

    #[test]
    fn test_auth_errors() {
        assert_eq!(
            Error::Auth(AuthError::MissingSession).kind(),
            ErrorKind::Unauthenticated
        );
        assert_eq!(
            Error::Auth(AuthError::Storage("locked".to_string())).kind(),
            ErrorKind::Unclassified
        );
    }
}

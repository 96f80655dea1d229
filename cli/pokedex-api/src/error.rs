//! Error handling for Pokédex API operations.
//!
//! Every non-success response is turned into one [ApiError] carrying a
//! displayable message, so callers never inspect transport status codes.
//! Operation specific errors ([AuthError], [FetchError]) wrap [ClientError].

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::token::TokenStoreError;
use crate::types::ValidationError;

/// Message used when an error body can't be parsed at all.
pub const GENERIC_ERROR_MESSAGE: &str = "An error occurred";

/// A non-success response from the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    /// Build an error from a response status and its raw body.
    ///
    /// The backend reports errors as `{ "detail": ... }`.
    /// A string `detail` is used verbatim, structured details (e.g. validation
    /// errors) are rendered as JSON. A JSON body without a usable `detail`
    /// falls back to a status coded message, a body that isn't JSON at all
    /// to [GENERIC_ERROR_MESSAGE].
    pub fn from_body(status: StatusCode, body: &[u8]) -> Self {
        let message = match serde_json::from_slice::<Value>(body) {
            Ok(value) => match value.get("detail") {
                Some(Value::String(detail)) if !detail.is_empty() => detail.clone(),
                Some(Value::String(_)) | Some(Value::Null) | None => status_message(status),
                Some(other) => other.to_string(),
            },
            Err(_) => GENERIC_ERROR_MESSAGE.to_string(),
        };

        Self { status, message }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }
}

fn status_message(status: StatusCode) -> String {
    format!("HTTP error {}", status.as_u16())
}

/// Common error type for all adapter operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("could not reach the Pokédex API")]
    Request(#[source] reqwest::Error),
    #[error("failed to parse response from the Pokédex API")]
    Decode(#[source] reqwest::Error),
    #[error("invalid API url '{0}'")]
    InvalidUrl(String),
    #[error(transparent)]
    TokenStore(#[from] TokenStoreError),
    #[error("{0}")]
    Other(String),
}

/// Failure to log in or to verify a session.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// No token is stored, so no request was sent.
    #[error("Not authenticated")]
    NotAuthenticated,
    /// The session was ended while the operation was in flight.
    #[error("Logged out before the session was established")]
    Cancelled,
    #[error(transparent)]
    Client(#[from] ClientError),
}

impl From<TokenStoreError> for AuthError {
    fn from(err: TokenStoreError) -> Self {
        AuthError::Client(ClientError::TokenStore(err))
    }
}

impl AuthError {
    /// Whether the backend rejected the credentials or the token.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            AuthError::NotAuthenticated => true,
            AuthError::Client(ClientError::Api(api_error)) => api_error.is_unauthorized(),
            _ => false,
        }
    }
}

/// Failure to retrieve list pages or detail records.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{0}")]
    NotFound(ApiError),
    #[error(transparent)]
    Client(#[from] ClientError),
}

impl FetchError {
    /// Maps 404 responses to [FetchError::NotFound],
    /// so consumers don't need to inspect the raw error.
    pub(crate) fn from_detail_error(err: ClientError) -> Self {
        match err {
            ClientError::Api(api_error) if api_error.status == StatusCode::NOT_FOUND => {
                FetchError::NotFound(api_error)
            },
            other => FetchError::Client(other),
        }
    }
}

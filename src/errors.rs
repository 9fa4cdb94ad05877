//! # Error Types Module
//!
//! Structured errors for the storage layer, the VK API client and a single
//! dialogue turn. Storage callers can always tell "no data" (`Ok(None)`)
//! apart from a failed operation (`Err`).

use thiserror::Error;

/// Errors raised by a [`crate::store::PreferenceStore`] implementation
#[derive(Debug, Error)]
pub enum StoreError {
    /// Query, connection or transaction failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored position code that maps to no dialogue step
    #[error("invalid dialogue position code: {0}")]
    InvalidPosition(i16),

    /// A row the operation depends on does not exist
    #[error("{entity} not found for user {user_id}")]
    NotFound { entity: &'static str, user_id: i64 },
}

/// Errors raised while talking to the VK API
#[derive(Debug, Error)]
pub enum VkError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with an `error` object
    #[error("api error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// A successful envelope without the expected payload
    #[error("empty response from {0}")]
    EmptyResponse(String),

    /// Too many consecutive failures, calls are rejected until the reset timeout
    #[error("circuit breaker open, request rejected")]
    CircuitOpen,

    #[error("long poll error: {0}")]
    LongPoll(String),
}

/// Failure of one dialogue turn, classified by how the user is answered
#[derive(Debug, Error)]
pub enum DialogError {
    /// Search, photo, city or name lookup failed
    #[error("transient api failure: {0}")]
    Api(#[source] VkError),

    #[error("storage failure: {0}")]
    Store(#[from] StoreError),

    /// An outbound message could not be delivered
    #[error("message delivery failed: {0}")]
    Delivery(#[source] VkError),
}

impl From<VkError> for DialogError {
    fn from(err: VkError) -> Self {
        DialogError::Api(err)
    }
}

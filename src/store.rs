//! The storage operations the polling pipeline depends on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db::{Feed, NewPost};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A row with this unique value already exists.
    #[error("already exists: {0}")]
    UniqueViolation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait FeedStore: Send + Sync {
    /// The feed fetched longest ago; never-fetched feeds come first.
    async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, StoreError>;

    async fn mark_feed_fetched(&self, feed_id: &str, at: DateTime<Utc>)
        -> Result<Feed, StoreError>;

    /// Fails with [`StoreError::UniqueViolation`] when the post URL is taken.
    async fn insert_post(&self, post: &NewPost) -> Result<(), StoreError>;
}

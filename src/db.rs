use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, FromRow, SqlitePool};
use uuid::Uuid;

use crate::store::{FeedStore, StoreError};

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct Feed {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub url: String,
    pub user_id: String,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct FeedWithOwner {
    pub name: String,
    pub url: String,
    pub user_name: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct FeedFollow {
    pub id: String,
    pub user_name: String,
    pub feed_name: String,
    pub feed_url: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct Post {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub feed_id: String,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// A post joined with the name of the feed it came from.
#[derive(Debug, Clone, FromRow)]
pub struct PostWithFeed {
    pub id: String,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub feed_name: String,
}

/// A post as submitted by the ingester.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub feed_id: String,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

pub struct Database {
    pool: SqlitePool,
}

/// Maps a unique-constraint failure to [`StoreError::UniqueViolation`].
fn unique_or(err: sqlx::Error, value: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::UniqueViolation(value.to_string())
        }
        _ => StoreError::Database(err),
    }
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let mut options = SqlitePoolOptions::new().max_connections(5);

        // Every connection to `:memory:` opens a distinct database.
        if database_url.contains(":memory:") {
            options = options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = options.connect(database_url).await?;

        Ok(Self { pool })
    }

    pub async fn initialize(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                name TEXT NOT NULL UNIQUE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feeds (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                name TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                last_fetched_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feed_follows (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                feed_id TEXT NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                UNIQUE(user_id, feed_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                feed_id TEXT NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                description TEXT,
                published_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_feeds_last_fetched
            ON feeds(last_fetched_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_posts_feed_published
            ON posts(feed_id, published_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Deletes every user; feeds, follows and posts go with them.
    pub async fn reset(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM users")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn create_user(&self, name: &str) -> Result<User, StoreError> {
        let now = Utc::now();
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, created_at, updated_at, name)
            VALUES (?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(now)
        .bind(now)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_or(e, name))
    }

    pub async fn get_user_by_name(&self, name: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    pub async fn create_feed(
        &self,
        name: &str,
        url: &str,
        user_id: &str,
    ) -> Result<Feed, StoreError> {
        let now = Utc::now();
        sqlx::query_as::<_, Feed>(
            r#"
            INSERT INTO feeds (id, created_at, updated_at, name, url, user_id)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(now)
        .bind(now)
        .bind(name)
        .bind(url)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_or(e, url))
    }

    pub async fn get_feed(&self, feed_id: &str) -> Result<Option<Feed>, StoreError> {
        let feed = sqlx::query_as::<_, Feed>("SELECT * FROM feeds WHERE id = ?")
            .bind(feed_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(feed)
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>, StoreError> {
        let feed = sqlx::query_as::<_, Feed>("SELECT * FROM feeds WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(feed)
    }

    pub async fn list_feeds_with_owner(&self) -> Result<Vec<FeedWithOwner>, StoreError> {
        let feeds = sqlx::query_as::<_, FeedWithOwner>(
            r#"
            SELECT feeds.name, feeds.url, users.name AS user_name
            FROM feeds
            JOIN users ON users.id = feeds.user_id
            ORDER BY feeds.created_at, feeds.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }

    pub async fn create_feed_follow(
        &self,
        user_id: &str,
        feed_id: &str,
    ) -> Result<FeedFollow, StoreError> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO feed_follows (id, created_at, updated_at, user_id, feed_id)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(now)
        .bind(now)
        .bind(user_id)
        .bind(feed_id)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_or(e, feed_id))?;

        let follow = sqlx::query_as::<_, FeedFollow>(
            r#"
            SELECT feed_follows.id, users.name AS user_name,
                   feeds.name AS feed_name, feeds.url AS feed_url
            FROM feed_follows
            JOIN users ON users.id = feed_follows.user_id
            JOIN feeds ON feeds.id = feed_follows.feed_id
            WHERE feed_follows.id = ?
            "#,
        )
        .bind(&id)
        .fetch_one(&self.pool)
        .await?;
        Ok(follow)
    }

    /// Returns `false` if the user was not following the feed.
    pub async fn delete_feed_follow(
        &self,
        user_id: &str,
        feed_id: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM feed_follows WHERE user_id = ? AND feed_id = ?")
            .bind(user_id)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_follows_for_user(&self, user_id: &str) -> Result<Vec<FeedFollow>, StoreError> {
        let follows = sqlx::query_as::<_, FeedFollow>(
            r#"
            SELECT feed_follows.id, users.name AS user_name,
                   feeds.name AS feed_name, feeds.url AS feed_url
            FROM feed_follows
            JOIN users ON users.id = feed_follows.user_id
            JOIN feeds ON feeds.id = feed_follows.feed_id
            WHERE feed_follows.user_id = ?
            ORDER BY feed_follows.created_at, feeds.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(follows)
    }

    pub async fn get_posts_for_feed(&self, feed_id: &str) -> Result<Vec<Post>, StoreError> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT * FROM posts
            WHERE feed_id = ?
            ORDER BY published_at DESC NULLS LAST, created_at DESC
            "#,
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    /// Newest posts from the feeds a user follows.
    pub async fn get_posts_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<PostWithFeed>, StoreError> {
        let posts = sqlx::query_as::<_, PostWithFeed>(
            r#"
            SELECT posts.id, posts.title, posts.url, posts.description,
                   posts.published_at, feeds.name AS feed_name
            FROM posts
            JOIN feed_follows ON feed_follows.feed_id = posts.feed_id
            JOIN feeds ON feeds.id = posts.feed_id
            WHERE feed_follows.user_id = ?
            ORDER BY posts.published_at DESC NULLS LAST, posts.created_at DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    pub async fn get_post_count(&self) -> Result<i64, StoreError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}

#[async_trait]
impl FeedStore for Database {
    async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, StoreError> {
        let feed = sqlx::query_as::<_, Feed>(
            r#"
            SELECT * FROM feeds
            ORDER BY last_fetched_at ASC NULLS FIRST, created_at ASC, id ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    async fn mark_feed_fetched(
        &self,
        feed_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Feed, StoreError> {
        sqlx::query_as::<_, Feed>(
            r#"
            UPDATE feeds
            SET last_fetched_at = ?, updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(at)
        .bind(at)
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("feed {}", feed_id)))
    }

    async fn insert_post(&self, post: &NewPost) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO posts
                (id, created_at, updated_at, feed_id, title, url, description, published_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(post.created_at)
        .bind(post.updated_at)
        .bind(&post.feed_id)
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(post.published_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_or(e, &post.url))?;

        Ok(())
    }
}

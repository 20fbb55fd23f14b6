//! Command-line surface: argument parsing and one handler per command.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::clock::SystemClock;
use crate::config::{parse_duration, Config, ConfigError};
use crate::db::{Database, User};
use crate::fetcher::{FetchError, Fetcher};
use crate::scheduler::{Scheduler, SchedulerError};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("no user is logged in; run `gator login <name>` first")]
    NotLoggedIn,

    #[error("user {0:?} does not exist")]
    UnknownUser(String),

    #[error("user {0:?} already exists")]
    UserExists(String),

    #[error("a feed with url {0:?} already exists")]
    FeedExists(String),

    #[error("no feed with url {0:?}")]
    UnknownFeed(String),

    #[error("already following {0:?}")]
    AlreadyFollowing(String),

    #[error("not following {0:?}")]
    NotFollowing(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Parser)]
#[command(name = "gator", version, about = "A command-line RSS aggregator")]
pub struct Cli {
    /// Path to the config file [default: ~/.gatorconfig.toml]
    #[arg(long, env = "GATOR_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, PartialEq)]
pub enum Command {
    /// Create a user and log in as them
    Register { name: String },
    /// Switch the current user
    Login { name: String },
    /// Delete all users, feeds, follows and posts
    Reset,
    /// List users
    Users,
    /// Poll feeds forever, one feed per interval (e.g. `30s`, `1m`, `1h30m`)
    Agg { time_between_reqs: String },
    /// Add a feed and follow it
    Addfeed { name: String, url: String },
    /// List all feeds
    Feeds,
    /// Follow an existing feed
    Follow { url: String },
    /// List the feeds you follow
    Following,
    /// Stop following a feed
    Unfollow { url: String },
    /// Show the newest posts from the feeds you follow
    Browse {
        #[arg(default_value_t = 2, value_parser = clap::value_parser!(i64).range(1..))]
        limit: i64,
    },
}

/// Everything a command handler may touch.
pub struct State {
    pub db: Arc<Database>,
    pub config: Config,
    pub config_path: PathBuf,
}

/// Resolve the logged-in user from storage on every call.
async fn current_user(state: &State) -> Result<User, CommandError> {
    let name = state
        .config
        .current_user_name
        .as_deref()
        .ok_or(CommandError::NotLoggedIn)?;

    state
        .db
        .get_user_by_name(name)
        .await?
        .ok_or_else(|| CommandError::UnknownUser(name.to_string()))
}

pub async fn dispatch<W: Write>(
    state: &mut State,
    command: Command,
    out: &mut W,
) -> Result<(), CommandError> {
    match command {
        Command::Register { name } => register(state, &name, out).await,
        Command::Login { name } => login(state, &name, out).await,
        Command::Reset => reset(state, out).await,
        Command::Users => users(state, out).await,
        Command::Agg { time_between_reqs } => agg(state, &time_between_reqs).await,
        Command::Feeds => feeds(state, out).await,
        Command::Addfeed { name, url } => {
            let user = current_user(state).await?;
            add_feed(state, &user, &name, &url, out).await
        }
        Command::Follow { url } => {
            let user = current_user(state).await?;
            follow(state, &user, &url, out).await
        }
        Command::Following => {
            let user = current_user(state).await?;
            following(state, &user, out).await
        }
        Command::Unfollow { url } => {
            let user = current_user(state).await?;
            unfollow(state, &user, &url, out).await
        }
        Command::Browse { limit } => {
            let user = current_user(state).await?;
            browse(state, &user, limit, out).await
        }
    }
}

async fn register<W: Write>(state: &mut State, name: &str, out: &mut W) -> Result<(), CommandError> {
    let user = state.db.create_user(name).await.map_err(|e| match e {
        StoreError::UniqueViolation(_) => CommandError::UserExists(name.to_string()),
        other => other.into(),
    })?;

    state.config.set_user(&user.name, &state.config_path)?;
    info!("Registered user {}", user.name);
    writeln!(out, "User {} created", user.name)?;
    Ok(())
}

async fn login<W: Write>(state: &mut State, name: &str, out: &mut W) -> Result<(), CommandError> {
    if state.db.get_user_by_name(name).await?.is_none() {
        return Err(CommandError::UnknownUser(name.to_string()));
    }

    state.config.set_user(name, &state.config_path)?;
    writeln!(out, "Current user set to {}", name)?;
    Ok(())
}

async fn reset<W: Write>(state: &State, out: &mut W) -> Result<(), CommandError> {
    state.db.reset().await?;
    writeln!(out, "Database reset")?;
    Ok(())
}

async fn users<W: Write>(state: &State, out: &mut W) -> Result<(), CommandError> {
    let current = state.config.current_user_name.as_deref();
    for user in state.db.list_users().await? {
        if Some(user.name.as_str()) == current {
            writeln!(out, "* {} (current)", user.name)?;
        } else {
            writeln!(out, "* {}", user.name)?;
        }
    }
    Ok(())
}

async fn agg(state: &State, time_between_reqs: &str) -> Result<(), CommandError> {
    let every = parse_duration(time_between_reqs)?;
    let fetcher = Fetcher::new(&state.config.user_agent, state.config.fetch_timeout())?;
    let scheduler = Scheduler::new(state.db.clone(), fetcher, Arc::new(SystemClock));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping");
            on_signal.cancel();
        }
    });

    scheduler.run(every, cancel).await?;
    Ok(())
}

async fn feeds<W: Write>(state: &State, out: &mut W) -> Result<(), CommandError> {
    for feed in state.db.list_feeds_with_owner().await? {
        writeln!(out, "* {}", feed.name)?;
        writeln!(out, "  {}", feed.url)?;
        writeln!(out, "  added by {}", feed.user_name)?;
    }
    Ok(())
}

async fn add_feed<W: Write>(
    state: &State,
    user: &User,
    name: &str,
    url: &str,
    out: &mut W,
) -> Result<(), CommandError> {
    let feed = state
        .db
        .create_feed(name, url, &user.id)
        .await
        .map_err(|e| match e {
            StoreError::UniqueViolation(_) => CommandError::FeedExists(url.to_string()),
            other => other.into(),
        })?;

    writeln!(out, "Feed {} added ({})", feed.name, feed.url)?;
    follow(state, user, &feed.url, out).await
}

async fn follow<W: Write>(
    state: &State,
    user: &User,
    url: &str,
    out: &mut W,
) -> Result<(), CommandError> {
    let feed = state
        .db
        .get_feed_by_url(url)
        .await?
        .ok_or_else(|| CommandError::UnknownFeed(url.to_string()))?;

    let follow = state
        .db
        .create_feed_follow(&user.id, &feed.id)
        .await
        .map_err(|e| match e {
            StoreError::UniqueViolation(_) => CommandError::AlreadyFollowing(feed.name.clone()),
            other => other.into(),
        })?;

    writeln!(out, "{} is now following {}", follow.user_name, follow.feed_name)?;
    Ok(())
}

async fn following<W: Write>(state: &State, user: &User, out: &mut W) -> Result<(), CommandError> {
    let follows = state.db.list_follows_for_user(&user.id).await?;

    if follows.is_empty() {
        writeln!(out, "You're not following any feeds")?;
        return Ok(());
    }

    writeln!(out, "You are following:")?;
    for follow in follows {
        writeln!(out, " - {}", follow.feed_name)?;
    }
    Ok(())
}

async fn unfollow<W: Write>(
    state: &State,
    user: &User,
    url: &str,
    out: &mut W,
) -> Result<(), CommandError> {
    let feed = state
        .db
        .get_feed_by_url(url)
        .await?
        .ok_or_else(|| CommandError::UnknownFeed(url.to_string()))?;

    if !state.db.delete_feed_follow(&user.id, &feed.id).await? {
        return Err(CommandError::NotFollowing(feed.name));
    }

    writeln!(out, "{} unfollowed successfully!", feed.name)?;
    Ok(())
}

async fn browse<W: Write>(
    state: &State,
    user: &User,
    limit: i64,
    out: &mut W,
) -> Result<(), CommandError> {
    let posts = state.db.get_posts_for_user(&user.id, limit).await?;

    writeln!(out, "Found {} posts for user {}:", posts.len(), user.name)?;
    for post in posts {
        let date = post
            .published_at
            .map(|d| d.format("%a %b %-d").to_string())
            .unwrap_or_else(|| "Unknown date".to_string());
        writeln!(out, "{} from {}", date, post.feed_name)?;
        writeln!(out, "--- {} ---", post.title)?;
        if let Some(description) = post.description {
            writeln!(out, "    {}", description)?;
        }
        writeln!(out, "Link: {}", post.url)?;
        writeln!(out, "=====================================")?;
    }
    Ok(())
}

//! Gator - A command-line RSS aggregator
//!
//! Users register feeds and follow them; a background polling loop fetches
//! the least recently fetched feed on every tick and stores its new posts.

pub mod clock;
pub mod commands;
pub mod config;
pub mod db;
pub mod fetcher;
pub mod ingest;
pub mod scheduler;
pub mod store;

//! The polling loop: one feed per tick, least recently fetched first.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::fetcher::{FetchError, Fetcher};
use crate::ingest::ingest;
use crate::store::FeedStore;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("tick interval must be greater than zero")]
    InvalidInterval,
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No feeds are registered.
    Idle,
    /// The next feed could not be selected or marked.
    StoreFailed,
    FetchFailed { feed_id: String },
    /// The fetch was abandoned because the loop is shutting down.
    Cancelled { feed_id: String },
    Ingested { feed_id: String, new_posts: usize },
}

pub struct Scheduler {
    store: Arc<dyn FeedStore>,
    fetcher: Fetcher,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn FeedStore>, fetcher: Fetcher, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            fetcher,
            clock,
        }
    }

    /// Tick every `every` until `cancel` fires.
    ///
    /// The first tick happens immediately. A tick that overruns the interval
    /// delays the next one; missed ticks are dropped rather than queued.
    pub async fn run(
        &self,
        every: Duration,
        cancel: CancellationToken,
    ) -> Result<(), SchedulerError> {
        if every.is_zero() {
            return Err(SchedulerError::InvalidInterval);
        }

        info!("Collecting feeds every {:?}", every);

        let mut timer = interval(every);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = timer.tick() => {}
            }
            self.tick(&cancel).await;
        }

        info!("Feed collection stopped");
        Ok(())
    }

    /// Select, mark and scrape the next feed.
    pub async fn tick(&self, cancel: &CancellationToken) -> TickOutcome {
        let feed = match self.store.next_feed_to_fetch().await {
            Ok(Some(feed)) => feed,
            Ok(None) => {
                info!("No feeds to fetch");
                return TickOutcome::Idle;
            }
            Err(e) => {
                error!("Couldn't get next feed to fetch: {}", e);
                return TickOutcome::StoreFailed;
            }
        };

        // Marked before fetching so a broken feed waits for its next turn.
        if let Err(e) = self
            .store
            .mark_feed_fetched(&feed.id, self.clock.now())
            .await
        {
            error!("Couldn't mark feed '{}' fetched: {}", feed.name, e);
            return TickOutcome::StoreFailed;
        }

        info!("Fetching feed: {} ({})", feed.name, feed.url);

        let doc = match self.fetcher.fetch(&feed.url, cancel).await {
            Ok(doc) => doc,
            Err(FetchError::Cancelled) => {
                info!("Fetch of feed '{}' cancelled", feed.name);
                return TickOutcome::Cancelled { feed_id: feed.id };
            }
            Err(e) => {
                warn!("Couldn't collect feed '{}': {}", feed.name, e);
                return TickOutcome::FetchFailed { feed_id: feed.id };
            }
        };

        let new_posts = ingest(self.store.as_ref(), self.clock.as_ref(), &feed.id, &doc).await;
        info!(
            "Feed '{}' collected, {} entries found, {} new",
            feed.name,
            doc.entries.len(),
            new_posts
        );

        TickOutcome::Ingested {
            feed_id: feed.id,
            new_posts,
        }
    }
}

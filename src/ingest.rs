use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::db::NewPost;
use crate::fetcher::{Entry, FeedDocument};
use crate::store::{FeedStore, StoreError};

/// RFC 1123 with a numeric zone after the `Mon, ` prefix,
/// e.g. `Mon, 02 Jan 2006 15:04:05 -0700`.
const PUB_DATE_FORMAT: &str = "%d %b %Y %H:%M:%S %z";

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Parse a `pubDate`. Anything other than RFC 1123 with a numeric zone is
/// treated as unknown. The weekday must be a valid abbreviation but need not
/// match the date.
pub fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let (weekday, rest) = raw.trim().split_once(", ")?;
    if !WEEKDAYS.contains(&weekday) {
        return None;
    }

    DateTime::parse_from_str(rest, PUB_DATE_FORMAT)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn to_new_post(feed_id: &str, entry: &Entry, now: DateTime<Utc>) -> NewPost {
    NewPost {
        id: Uuid::new_v4().to_string(),
        created_at: now,
        updated_at: now,
        feed_id: feed_id.to_string(),
        title: entry.title.clone(),
        url: entry.link.clone(),
        description: (!entry.description.is_empty()).then(|| entry.description.clone()),
        published_at: entry.pub_date.as_deref().and_then(parse_pub_date),
    }
}

/// Store every entry of `doc` as a post of `feed_id`.
///
/// Posts whose URL is already stored are skipped silently. Any other storage
/// failure is logged and only costs that one entry. Returns the number of
/// posts actually inserted.
pub async fn ingest(
    store: &dyn FeedStore,
    clock: &dyn Clock,
    feed_id: &str,
    doc: &FeedDocument,
) -> usize {
    let mut inserted = 0;

    for entry in &doc.entries {
        if entry.link.trim().is_empty() {
            warn!("Skipping entry with no link: {}", entry.title);
            continue;
        }

        let post = to_new_post(feed_id, entry, clock.now());

        match store.insert_post(&post).await {
            Ok(()) => inserted += 1,
            Err(StoreError::UniqueViolation(url)) => {
                debug!("Post already known: {}", url);
            }
            Err(e) => {
                error!("Couldn't create post {}: {}", post.url, e);
            }
        }
    }

    inserted
}

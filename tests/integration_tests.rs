//! Integration tests for the gator RSS aggregator
//!
//! These tests drive the full pipeline against an on-disk database and a
//! local HTTP server: scheduling, fetching, ingestion and browsing.

mod common {
    use tempfile::TempDir;

    /// Create a temporary directory for test databases
    pub fn create_temp_dir() -> TempDir {
        tempfile::tempdir().expect("Failed to create temp directory")
    }

    /// Create a test database path
    pub fn create_db_path(temp_dir: &TempDir) -> String {
        let db_path = temp_dir.path().join("test.db");
        format!("sqlite:{}?mode=rwc", db_path.display())
    }

    pub fn rss_feed(title: &str, items: &[(&str, &str, &str)]) -> String {
        let items: String = items
            .iter()
            .map(|(title, link, pub_date)| {
                format!(
                    r#"
                    <item>
                        <title>{}</title>
                        <link>{}</link>
                        <description>Summary of {}</description>
                        <pubDate>{}</pubDate>
                    </item>"#,
                    title, link, title, pub_date
                )
            })
            .collect();

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
            <rss version="2.0">
                <channel>
                    <title>{}</title>
                    <link>https://example.com</link>
                    <description>Test feed</description>
                    {}
                </channel>
            </rss>"#,
            title, items
        )
    }
}

#[cfg(test)]
mod config_integration_tests {
    use gator::config::Config;

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".gatorconfig.toml");

        let mut config = Config::default();
        config.db_url = "sqlite:/tmp/somewhere.db".to_string();
        config.fetch_timeout_secs = 12;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(loaded.current_user_name.is_none());
    }
}

#[cfg(test)]
mod database_integration_tests {
    use super::common::*;
    use chrono::Utc;
    use gator::db::{Database, NewPost};
    use gator::store::FeedStore;

    #[tokio::test]
    async fn test_database_persistence() {
        let temp_dir = create_temp_dir();
        let db_url = create_db_path(&temp_dir);

        // Create database and add data
        {
            let db = Database::new(&db_url).await.unwrap();
            db.initialize().await.unwrap();

            let user = db.create_user("alice").await.unwrap();
            let feed = db
                .create_feed("Persistent Feed", "https://persistent.com/rss", &user.id)
                .await
                .unwrap();
            let now = Utc::now();
            db.insert_post(&NewPost {
                id: "post-1".to_string(),
                created_at: now,
                updated_at: now,
                feed_id: feed.id.clone(),
                title: "Persistent Article".to_string(),
                url: "https://persistent.com/article".to_string(),
                description: None,
                published_at: None,
            })
            .await
            .unwrap();
            db.mark_feed_fetched(&feed.id, now).await.unwrap();
        }

        // Reopen database and verify data persists
        {
            let db = Database::new(&db_url).await.unwrap();

            let feeds = db.list_feeds_with_owner().await.unwrap();
            assert_eq!(feeds.len(), 1);
            assert_eq!(feeds[0].name, "Persistent Feed");
            assert_eq!(feeds[0].user_name, "alice");

            let feed = db.next_feed_to_fetch().await.unwrap().unwrap();
            assert!(feed.last_fetched_at.is_some());

            let posts = db.get_posts_for_feed(&feed.id).await.unwrap();
            assert_eq!(posts.len(), 1);
            assert_eq!(posts[0].title, "Persistent Article");
        }
    }
}

#[cfg(test)]
mod end_to_end_tests {
    use super::common::*;
    use chrono::{TimeZone, Utc};
    use gator::clock::ManualClock;
    use gator::db::Database;
    use gator::fetcher::Fetcher;
    use gator::scheduler::{Scheduler, TickOutcome};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup_db(temp_dir: &tempfile::TempDir) -> Arc<Database> {
        let db = Database::new(&create_db_path(temp_dir)).await.unwrap();
        db.initialize().await.unwrap();
        Arc::new(db)
    }

    #[tokio::test]
    async fn test_poll_then_browse() {
        let temp_dir = create_temp_dir();
        let db = setup_db(&temp_dir).await;
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/tech.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(rss_feed(
                "Tech &amp;amp; Stuff",
                &[
                    (
                        "Breaking: New Technology",
                        "https://tech.example.com/1",
                        "Mon, 09 Dec 2024 12:00:00 +0000",
                    ),
                    (
                        "Review: Latest Gadget",
                        "https://tech.example.com/2",
                        "Mon, 09 Dec 2024 10:00:00 GMT",
                    ),
                ],
            )))
            .mount(&server)
            .await;

        let alice = db.create_user("alice").await.unwrap();
        let feed = db
            .create_feed("Tech", &format!("{}/tech.xml", server.uri()), &alice.id)
            .await
            .unwrap();
        db.create_feed_follow(&alice.id, &feed.id).await.unwrap();

        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 12, 10, 8, 0, 0).unwrap(),
        ));
        let fetcher = Fetcher::new("gator", Duration::from_secs(5)).unwrap();
        let scheduler = Scheduler::new(db.clone(), fetcher, clock.clone());

        let outcome = scheduler.tick(&CancellationToken::new()).await;
        assert_eq!(
            outcome,
            TickOutcome::Ingested {
                feed_id: feed.id.clone(),
                new_posts: 2
            }
        );

        let posts = db.get_posts_for_user(&alice.id, 10).await.unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].title, "Breaking: New Technology");
        assert!(posts[0].published_at.is_some());
        // GMT is not a numeric zone, so the date is unknown
        assert_eq!(posts[1].title, "Review: Latest Gadget");
        assert!(posts[1].published_at.is_none());
        assert!(posts.iter().all(|p| p.feed_name == "Tech"));
    }

    #[tokio::test]
    async fn test_one_failing_feed_does_not_stop_others() {
        let temp_dir = create_temp_dir();
        let db = setup_db(&temp_dir).await;
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/broken.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/good.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(rss_feed(
                "Good",
                &[(
                    "Hello",
                    "https://good.example.com/hello",
                    "Tue, 10 Dec 2024 07:00:00 +0000",
                )],
            )))
            .mount(&server)
            .await;

        let user = db.create_user("alice").await.unwrap();
        let broken = db
            .create_feed("Broken", &format!("{}/broken.xml", server.uri()), &user.id)
            .await
            .unwrap();
        let good = db
            .create_feed("Good", &format!("{}/good.xml", server.uri()), &user.id)
            .await
            .unwrap();

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let fetcher = Fetcher::new("gator", Duration::from_secs(5)).unwrap();
        let scheduler = Scheduler::new(db.clone(), fetcher, clock.clone());
        let cancel = CancellationToken::new();

        let first = scheduler.tick(&cancel).await;
        clock.advance(chrono::Duration::seconds(1));
        let second = scheduler.tick(&cancel).await;

        let mut outcomes = vec![first, second];
        outcomes.sort_by_key(|o| matches!(o, TickOutcome::Ingested { .. }));
        assert_eq!(
            outcomes,
            vec![
                TickOutcome::FetchFailed { feed_id: broken.id },
                TickOutcome::Ingested {
                    feed_id: good.id,
                    new_posts: 1
                },
            ]
        );
        assert_eq!(db.get_post_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_run_loop_covers_every_feed() {
        let temp_dir = create_temp_dir();
        let db = setup_db(&temp_dir).await;
        let server = MockServer::start().await;

        let user = db.create_user("alice").await.unwrap();
        for i in 1..=3 {
            let route = format!("/feed{}.xml", i);
            let link = format!("https://site{}.example.com/post", i);
            Mock::given(method("GET"))
                .and(path(route.as_str()))
                .respond_with(ResponseTemplate::new(200).set_body_string(rss_feed(
                    "Site",
                    &[("Post", link.as_str(), "Mon, 09 Dec 2024 12:00:00 +0000")],
                )))
                .mount(&server)
                .await;
            db.create_feed(
                &format!("Site {}", i),
                &format!("{}{}", server.uri(), route),
                &user.id,
            )
            .await
            .unwrap();
        }

        let fetcher = Fetcher::new("gator", Duration::from_secs(5)).unwrap();
        let scheduler = Arc::new(Scheduler::new(
            db.clone(),
            fetcher,
            Arc::new(gator::clock::SystemClock),
        ));
        let cancel = CancellationToken::new();
        let handle = {
            let scheduler = scheduler.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { scheduler.run(Duration::from_millis(20), cancel).await })
        };

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while db.get_post_count().await.unwrap() < 3 {
            assert!(
                std::time::Instant::now() < deadline,
                "feeds were not all polled in time"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        cancel.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(db.get_post_count().await.unwrap(), 3);
    }
}

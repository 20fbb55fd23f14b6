//! Retrieves an RSS 2.0 feed over HTTP and turns it into a [`FeedDocument`].

use std::time::Duration;

use reqwest::Client;
use rss::Channel;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("parse error: {0}")]
    Parse(#[from] rss::Error),

    #[error("fetch cancelled")]
    Cancelled,
}

/// A parsed feed. Lives for one fetch cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedDocument {
    pub title: String,
    pub description: String,
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entry {
    pub title: String,
    pub description: String,
    pub link: String,
    /// Raw `pubDate` text, unparsed.
    pub pub_date: Option<String>,
}

pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self { client })
    }

    /// GET `url` and parse the body. Resolves to [`FetchError::Cancelled`] as
    /// soon as `cancel` fires, dropping the in-flight request.
    pub async fn fetch(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<FeedDocument, FetchError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.fetch_document(url) => result,
        }
    }

    async fn fetch_document(&self, url: &str) -> Result<FeedDocument, FetchError> {
        debug!("Fetching {}", url);

        // Status codes are not interpreted; only the body is parsed.
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        debug!("Fetched {} bytes from {} ({})", bytes.len(), url, status);

        parse_document(&bytes)
    }
}

/// Parse an RSS 2.0 payload, decoding the HTML entities that feeds
/// commonly double-encode in titles and descriptions.
pub fn parse_document(bytes: &[u8]) -> Result<FeedDocument, FetchError> {
    let channel = Channel::read_from(bytes)?;

    let entries = channel
        .items()
        .iter()
        .map(|item| Entry {
            title: unescape(item.title().unwrap_or_default()),
            description: unescape(item.description().unwrap_or_default()),
            link: item.link().unwrap_or_default().to_string(),
            pub_date: item.pub_date().map(|d| d.to_string()),
        })
        .collect();

    Ok(FeedDocument {
        title: unescape(channel.title()),
        description: unescape(channel.description()),
        entries,
    })
}

/// Decode each HTML entity on its own. Bare `&` and unknown entities are
/// copied through literally.
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];

        let end = tail[1..]
            .find(|c: char| c == ';' || c == '&' || c.is_whitespace())
            .map(|i| i + 1);

        match end {
            Some(end) if tail.as_bytes()[end] == b';' => {
                let entity = &tail[..=end];
                match htmlescape::decode_html(entity) {
                    Ok(decoded) => out.push_str(&decoded),
                    Err(_) => out.push_str(entity),
                }
                rest = &tail[end + 1..];
            }
            _ => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

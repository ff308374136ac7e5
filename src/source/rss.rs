//! RSS feed source implementation.
//!
//! Fetches every configured podcast feed over HTTP and parses it with the
//! [`rss`] crate. Feeds are fetched concurrently, one scoped thread per
//! feed, and returned in configuration order.

use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Enclosure, Feed, FeedSource, Item};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// One configured feed: a label and the URL to poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEndpoint {
    pub name: String,
    pub url: String,
}

impl FeedEndpoint {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Fetches a fixed list of RSS feeds.
pub struct RssFeedSource {
    endpoints: Vec<FeedEndpoint>,
    client: reqwest::blocking::Client,
}

impl RssFeedSource {
    /// Create a source for `endpoints`, giving up on any single HTTP request
    /// after `timeout`.
    ///
    /// The blocking client must not be created from inside an async task.
    pub fn new(endpoints: Vec<FeedEndpoint>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("building HTTP client")?;
        Ok(Self { endpoints, client })
    }

    /// Convert an already-fetched [`rss::Channel`] into a [`Feed`].
    ///
    /// Pure, so tests can exercise it without the network.
    pub fn parse_channel(channel: &rss::Channel, endpoint: &FeedEndpoint) -> Feed {
        let image = channel
            .image()
            .map(|img| img.url().to_string())
            .or_else(|| {
                channel
                    .itunes_ext()
                    .and_then(|ext| ext.image())
                    .map(String::from)
            });

        let items = channel
            .items()
            .iter()
            .map(|item| {
                // Prefer <author>, fall back to <itunes:author>.
                let author = item
                    .author()
                    .or_else(|| item.itunes_ext().and_then(|ext| ext.author()))
                    .unwrap_or_default()
                    .to_string();

                let enclosures = item
                    .enclosure()
                    .map(|enc| Enclosure {
                        url: enc.url().to_string(),
                        mime_type: enc.mime_type().to_string(),
                    })
                    .into_iter()
                    .collect();

                Item {
                    title: item.title().unwrap_or("(untitled)").to_string(),
                    published: item.pub_date().unwrap_or_default().to_string(),
                    author,
                    enclosures,
                    image: item
                        .itunes_ext()
                        .and_then(|ext| ext.image())
                        .map(String::from),
                }
            })
            .collect();

        Feed {
            name: endpoint.name.clone(),
            url: endpoint.url.clone(),
            title: channel.title().to_string(),
            items,
            image,
        }
    }

    fn fetch_one(&self, endpoint: &FeedEndpoint) -> Result<Feed> {
        let body = self
            .client
            .get(&endpoint.url)
            .send()
            .and_then(|resp| resp.error_for_status())
            .with_context(|| format!("requesting {}", endpoint.url))?
            .bytes()
            .with_context(|| format!("reading {}", endpoint.url))?;
        let channel = rss::Channel::read_from(body.as_ref())
            .with_context(|| format!("parsing {}", endpoint.url))?;
        let feed = Self::parse_channel(&channel, endpoint);
        debug!(feed = %endpoint.name, items = feed.items.len(), "parsed feed");
        Ok(feed)
    }
}

impl FeedSource for RssFeedSource {
    fn fetch_all(&self) -> Result<Vec<Feed>> {
        if self.endpoints.is_empty() {
            bail!("no feeds configured");
        }

        let fetched: Vec<Option<Feed>> = thread::scope(|scope| {
            let handles: Vec<_> = self
                .endpoints
                .iter()
                .map(|endpoint| scope.spawn(move || self.fetch_one(endpoint)))
                .collect();

            handles
                .into_iter()
                .zip(&self.endpoints)
                .map(|(handle, endpoint)| match handle.join() {
                    Ok(Ok(feed)) => Some(feed),
                    Ok(Err(e)) => {
                        warn!(feed = %endpoint.name, error = %format!("{e:#}"), "failed to fetch feed");
                        None
                    }
                    Err(_) => {
                        warn!(feed = %endpoint.name, "feed fetch thread panicked");
                        None
                    }
                })
                .collect()
        });

        let feeds: Vec<Feed> = fetched.into_iter().flatten().collect();
        info!(
            fetched = feeds.len(),
            configured = self.endpoints.len(),
            "fetched feeds"
        );
        Ok(feeds)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

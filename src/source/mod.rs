//! Feed acquisition.
//!
//! This module defines the [`FeedSource`] trait and the [`Feed`] / [`Item`]
//! types it produces. The concrete RSS implementation lives in [`rss`].
//!
//! ## Adding a new source
//!
//! 1. Create a file in this directory (e.g. `atom.rs`).
//! 2. Implement [`FeedSource`] for a struct holding its configuration.
//! 3. Add `mod atom;` below and re-export the struct.
//! 4. Construct it in `main.rs` in place of [`RssFeedSource`].
//!
//! The cache, the directory nodes and the exporter only ever see [`Feed`]s.

mod feed;
mod rss;

pub use feed::{Enclosure, Feed, Item};
pub use rss::{FeedEndpoint, RssFeedSource};

#[cfg(test)]
pub(crate) use feed::tests::{make_feed, make_item};

use anyhow::Result;

/// Something that can fetch every configured feed in one round.
///
/// The feed cache calls [`fetch_all()`](FeedSource::fetch_all) from whichever
/// request thread finds the cache stale, so implementations must be
/// [`Send`] + [`Sync`].
pub trait FeedSource: Send + Sync {
    /// Fetch all configured feeds.
    ///
    /// A feed that cannot be fetched or parsed is logged and left out of the
    /// result. An error means the round could not be attempted at all (for
    /// example, nothing is configured).
    fn fetch_all(&self) -> Result<Vec<Feed>>;
}

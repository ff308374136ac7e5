//! The feed data shared by every feed source.
//!
//! A [`Feed`] is one podcast: its title, optional artwork and the ordered
//! list of [`Item`]s (episodes) as the publisher listed them. Sources convert
//! their native format into these structs so the rest of the service never
//! sees RSS.

use crate::address::ContentKey;

/// One podcast as fetched in a single round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    /// Name given to the feed in the configuration file.
    pub name: String,

    /// URL the feed was fetched from. Used as the content key when
    /// addresses are content-hashed.
    pub url: String,

    /// Display name published by the feed itself.
    pub title: String,

    /// Episodes in publisher order.
    pub items: Vec<Item>,

    /// URL of the podcast artwork, if the feed declares one.
    pub image: Option<String>,
}

/// One episode of a podcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub title: String,

    /// Publication date exactly as the feed wrote it. Never parsed; media
    /// servers only display it.
    pub published: String,

    pub author: String,

    /// Playable media attached to the episode, in feed order.
    pub enclosures: Vec<Enclosure>,

    /// Episode-specific artwork, if any.
    pub image: Option<String>,
}

/// A playable media resource attached to an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enclosure {
    pub url: String,
    pub mime_type: String,
}

impl Feed {
    /// The configured name stands in when a feed publishes no title.
    pub fn display_name(&self) -> &str {
        if self.title.is_empty() {
            &self.name
        } else {
            &self.title
        }
    }
}

impl ContentKey for Feed {
    fn content_key(&self) -> &str {
        &self.url
    }
}

impl ContentKey for Item {
    fn content_key(&self) -> &str {
        self.enclosures
            .first()
            .map(|e| e.url.as_str())
            .unwrap_or(&self.title)
    }
}

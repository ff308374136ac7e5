//! Read-only views of podcasts, episodes and artwork in the shape the
//! MediaServer2 interfaces expect.
//!
//! Views borrow from a [`FeedSnapshot`] through an `Arc` and are rebuilt for
//! every query; none of them outlives the request that created it. What
//! the exporter registers are handles that rebuild a view on each read,
//! plus artwork nodes, which carry only an image URL.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::Serialize;
use tracing::warn;

use crate::address::{Address, ART_SEGMENT};
use crate::cache::FeedSnapshot;
use crate::error::TreeError;
use crate::probe::{mime_from_extension, ImageInfo, ImageProbe};
use crate::source::{Feed, Item};

/// Property and listing field names, as seen by a media server.
pub mod fields {
    pub const PARENT: &str = "Parent";
    pub const TYPE: &str = "Type";
    pub const PATH: &str = "Path";
    pub const DISPLAY_NAME: &str = "DisplayName";

    pub const CHILD_COUNT: &str = "ChildCount";
    pub const ITEM_COUNT: &str = "ItemCount";
    pub const CONTAINER_COUNT: &str = "ContainerCount";
    pub const SEARCHABLE: &str = "Searchable";

    pub const URLS: &str = "URLs";
    pub const MIME_TYPE: &str = "MIMEType";
    pub const ARTIST: &str = "Artist";
    pub const ALBUM: &str = "Album";
    pub const DATE: &str = "Date";
    pub const ALBUM_ART: &str = "AlbumArt";

    pub const WIDTH: &str = "Width";
    pub const HEIGHT: &str = "Height";
    pub const DEPTH: &str = "Depth";
}

pub const TYPE_CONTAINER: &str = "container";
pub const TYPE_AUDIO: &str = "audio";
pub const TYPE_VIDEO: &str = "video";
pub const TYPE_IMAGE: &str = "image";

/// A property value or method result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    U32(u32),
    I32(i32),
    Str(String),
    Path(Address),
    StrList(Vec<String>),
    Entries(Vec<Entry>),
}

/// One result of a listing call: field name to value.
pub type Entry = BTreeMap<String, Value>;

impl Value {
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::U32(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            Value::Path(p) => Some(p.as_str()),
            _ => None,
        }
    }

    pub fn as_str_list(&self) -> Option<&[String]> {
        match self {
            Value::StrList(list) => Some(list),
            _ => None,
        }
    }

    pub fn into_entries(self) -> Option<Vec<Entry>> {
        match self {
            Value::Entries(entries) => Some(entries),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::U32(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<Address> for Value {
    fn from(v: Address) -> Self {
        Value::Path(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::StrList(v)
    }
}

impl From<Vec<Entry>> for Value {
    fn from(v: Vec<Entry>) -> Self {
        Value::Entries(v)
    }
}

/// Clamp a collection length into a `u32` count.
pub fn count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// The `MediaObject2` role shared by every node.
pub trait MediaObject {
    /// Address of the containing node. The root is its own parent.
    fn parent(&self) -> Address;

    fn object_type(&self) -> &'static str;

    fn path(&self) -> &Address;

    fn display_name(&self) -> Result<String, TreeError>;

    fn object_fields(&self) -> Result<Entry, TreeError> {
        let mut entry = Entry::new();
        entry.insert(fields::PARENT.into(), self.parent().into());
        entry.insert(fields::TYPE.into(), self.object_type().into());
        entry.insert(fields::PATH.into(), self.path().clone().into());
        entry.insert(fields::DISPLAY_NAME.into(), self.display_name()?.into());
        Ok(entry)
    }
}

/// The `MediaItem2` role: something a renderer can fetch.
pub trait MediaItem: MediaObject {
    /// Source URLs in their original order.
    fn urls(&self) -> Result<Vec<String>, TreeError>;

    fn mime_type(&self) -> Result<String, TreeError>;
}

// ---------------------------------------------------------------------------
// Artwork
// ---------------------------------------------------------------------------

/// An image URL whose dimensions and type are probed on first use.
///
/// Clones share the probe result.
#[derive(Clone)]
pub struct ImageRef(Arc<ImageRefInner>);

struct ImageRefInner {
    url: String,
    probe: Arc<dyn ImageProbe>,
    info: OnceLock<ImageInfo>,
}

impl ImageRef {
    pub fn new(url: impl Into<String>, probe: Arc<dyn ImageProbe>) -> Self {
        Self(Arc::new(ImageRefInner {
            url: url.into(),
            probe,
            info: OnceLock::new(),
        }))
    }

    pub fn url(&self) -> &str {
        &self.0.url
    }

    /// Probe the image once. A failed probe is logged and remembered as a
    /// 0x0 image whose type is guessed from the URL.
    pub fn info(&self) -> &ImageInfo {
        self.0.info.get_or_init(|| match self.0.probe.inspect(&self.0.url) {
            Ok(info) => info,
            Err(e) => {
                warn!(url = %self.0.url, error = %format!("{e:#}"), "failed to inspect image");
                ImageInfo {
                    width: 0,
                    height: 0,
                    mime_type: mime_from_extension(&self.0.url).to_string(),
                }
            }
        })
    }

    pub fn same_as(&self, other: &ImageRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageRef")
            .field("url", &self.0.url)
            .field("info", &self.0.info.get())
            .finish()
    }
}

/// Artwork exported as an `image` item below its episode.
#[derive(Debug, Clone)]
pub struct ImageNode {
    image: ImageRef,
    path: Address,
    parent: Address,
}

impl ImageNode {
    pub fn new(image: ImageRef, parent: Address) -> Self {
        Self {
            path: parent.child(ART_SEGMENT),
            image,
            parent,
        }
    }

    pub fn width(&self) -> i32 {
        i32::try_from(self.image.info().width).unwrap_or(i32::MAX)
    }

    pub fn height(&self) -> i32 {
        i32::try_from(self.image.info().height).unwrap_or(i32::MAX)
    }

    /// Colour depth is not reported by the probe.
    pub fn depth(&self) -> i32 {
        0
    }
}

impl MediaObject for ImageNode {
    fn parent(&self) -> Address {
        self.parent.clone()
    }

    fn object_type(&self) -> &'static str {
        TYPE_IMAGE
    }

    fn path(&self) -> &Address {
        &self.path
    }

    fn display_name(&self) -> Result<String, TreeError> {
        Ok("Cover".to_string())
    }
}

impl MediaItem for ImageNode {
    fn urls(&self) -> Result<Vec<String>, TreeError> {
        Ok(vec![self.image.url().to_string()])
    }

    fn mime_type(&self) -> Result<String, TreeError> {
        Ok(self.image.info().mime_type.clone())
    }
}

// ---------------------------------------------------------------------------
// Episodes
// ---------------------------------------------------------------------------

/// One feed item, viewed through the snapshot it came from.
#[derive(Debug, Clone)]
pub struct Episode {
    snapshot: Arc<FeedSnapshot>,
    feed_index: usize,
    item_index: usize,
    path: Address,
    parent: Address,
    art: Option<ImageRef>,
}

impl Episode {
    /// `None` if the indices do not name an item of `snapshot`.
    ///
    /// `directory_art` is used when the item carries no image of its own.
    pub fn new(
        snapshot: Arc<FeedSnapshot>,
        feed_index: usize,
        item_index: usize,
        path: Address,
        probe: &Arc<dyn ImageProbe>,
        directory_art: Option<ImageRef>,
    ) -> Option<Self> {
        let item = snapshot.feeds().get(feed_index)?.items.get(item_index)?;
        let art = match &item.image {
            Some(url) => Some(ImageRef::new(url.clone(), Arc::clone(probe))),
            None => directory_art,
        };
        let parent = path.parent()?;
        Some(Self {
            snapshot,
            feed_index,
            item_index,
            path,
            parent,
            art,
        })
    }

    fn feed(&self) -> &Feed {
        &self.snapshot.feeds()[self.feed_index]
    }

    fn item(&self) -> &Item {
        &self.feed().items[self.item_index]
    }

    pub fn artist(&self) -> &str {
        &self.item().author
    }

    /// Always the podcast's title, never the episode's.
    pub fn album(&self) -> &str {
        self.feed().display_name()
    }

    pub fn date(&self) -> &str {
        &self.item().published
    }

    pub fn album_art(&self) -> Option<&ImageRef> {
        self.art.as_ref()
    }

    pub fn art_node(&self) -> Option<ImageNode> {
        self.art
            .clone()
            .map(|image| ImageNode::new(image, self.path.clone()))
    }

    /// Full field set for a listing result.
    ///
    /// An episode without enclosures is still listed, with an empty `URLs`
    /// and no `MIMEType`, so counts and offsets stay consistent.
    pub fn listing_entry(&self) -> Entry {
        let item = self.item();
        let mut entry = Entry::new();
        entry.insert(fields::PARENT.into(), self.parent.clone().into());
        entry.insert(fields::TYPE.into(), self.object_type().into());
        entry.insert(fields::PATH.into(), self.path.clone().into());
        entry.insert(fields::DISPLAY_NAME.into(), item.title.clone().into());
        entry.insert(
            fields::URLS.into(),
            self.urls().unwrap_or_default().into(),
        );
        if let Ok(mime) = self.mime_type() {
            entry.insert(fields::MIME_TYPE.into(), mime.into());
        }
        entry.insert(fields::ARTIST.into(), self.artist().into());
        entry.insert(fields::ALBUM.into(), self.album().into());
        entry.insert(fields::DATE.into(), self.date().into());
        if self.art.is_some() {
            entry.insert(fields::ALBUM_ART.into(), self.path.child(ART_SEGMENT).into());
        }
        entry
    }
}

impl MediaObject for Episode {
    fn parent(&self) -> Address {
        self.parent.clone()
    }

    /// `video` for video enclosures, `audio` otherwise.
    fn object_type(&self) -> &'static str {
        match self.item().enclosures.first() {
            Some(enc) if enc.mime_type.starts_with("video/") => TYPE_VIDEO,
            _ => TYPE_AUDIO,
        }
    }

    fn path(&self) -> &Address {
        &self.path
    }

    fn display_name(&self) -> Result<String, TreeError> {
        Ok(self.item().title.clone())
    }
}

impl MediaItem for Episode {
    fn urls(&self) -> Result<Vec<String>, TreeError> {
        let enclosures = &self.item().enclosures;
        if enclosures.is_empty() {
            return Err(TreeError::NoPlayableContent(self.path.clone()));
        }
        Ok(enclosures.iter().map(|e| e.url.clone()).collect())
    }

    fn mime_type(&self) -> Result<String, TreeError> {
        self.item()
            .enclosures
            .first()
            .map(|e| e.mime_type.clone())
            .ok_or_else(|| TreeError::NoPlayableContent(self.path.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{make_feed, make_item, Enclosure};
    use crate::testing::FixedProbe;

    fn dir_path() -> Address {
        Address::root("Podcasts").unwrap().child("0")
    }

    fn probe() -> Arc<dyn ImageProbe> {
        Arc::new(FixedProbe::default())
    }

    fn episode_of(feed: crate::source::Feed, item_index: usize, art: Option<ImageRef>) -> Episode {
        let snapshot = Arc::new(FeedSnapshot::new(vec![feed]));
        let path = dir_path().child(&item_index.to_string());
        Episode::new(snapshot, 0, item_index, path, &probe(), art).unwrap()
    }

    #[test]
    fn episode_projects_item_fields() {
        let mut feed = make_feed("Show", &[]);
        let mut item = make_item("Pilot", &["https://a/1.mp3", "https://a/2.mp3"]);
        item.enclosures[1].mime_type = "audio/ogg".to_string();
        feed.items.push(item);
        let ep = episode_of(feed, 0, None);

        assert_eq!(ep.display_name().unwrap(), "Pilot");
        assert_eq!(ep.object_type(), TYPE_AUDIO);
        assert_eq!(ep.urls().unwrap(), ["https://a/1.mp3", "https://a/2.mp3"]);
        assert_eq!(ep.mime_type().unwrap(), "audio/mpeg", "first enclosure wins");
        assert_eq!(ep.album(), "Show", "album is the podcast title");
        assert_eq!(ep.artist(), "Host");
        assert_eq!(ep.date(), "Mon, 01 Jan 2024 00:00:00 +0000");
        assert_eq!(ep.parent(), dir_path());
    }

    #[test]
    fn episode_without_enclosures_has_no_playable_content() {
        let mut feed = make_feed("Show", &[]);
        feed.items.push(make_item("Teaser", &[]));
        let ep = episode_of(feed, 0, None);

        assert!(matches!(ep.urls(), Err(TreeError::NoPlayableContent(_))));
        assert!(matches!(ep.mime_type(), Err(TreeError::NoPlayableContent(_))));

        let entry = ep.listing_entry();
        assert_eq!(entry[fields::URLS], Value::StrList(Vec::new()));
        assert!(!entry.contains_key(fields::MIME_TYPE));
    }

    #[test]
    fn video_enclosures_are_typed_as_video() {
        let mut feed = make_feed("Show", &[]);
        let mut item = make_item("Clip", &["https://a/clip.mp4"]);
        item.enclosures[0] = Enclosure {
            url: "https://a/clip.mp4".into(),
            mime_type: "video/mp4".into(),
        };
        feed.items.push(item);
        assert_eq!(episode_of(feed, 0, None).object_type(), TYPE_VIDEO);
    }

    #[test]
    fn episode_art_prefers_item_image_over_directory_image() {
        let directory_art = ImageRef::new("https://a/show.jpg", probe());

        let mut feed = make_feed("Show", &["plain"]);
        let mut own = make_item("Own art", &["https://a/own.mp3"]);
        own.image = Some("https://a/own.jpg".to_string());
        feed.items.push(own);

        let plain = episode_of(feed.clone(), 0, Some(directory_art.clone()));
        assert!(plain.album_art().unwrap().same_as(&directory_art));

        let own = episode_of(feed, 1, Some(directory_art));
        assert_eq!(own.album_art().unwrap().url(), "https://a/own.jpg");

        let node = own.art_node().unwrap();
        assert_eq!(node.path(), &own.path().child(ART_SEGMENT));
        assert_eq!(node.parent(), own.path().clone());
        assert_eq!(
            own.listing_entry()[fields::ALBUM_ART],
            Value::Path(node.path().clone())
        );
    }

    #[test]
    fn out_of_range_indices_produce_no_view() {
        let snapshot = Arc::new(FeedSnapshot::new(vec![make_feed("Show", &["a"])]));
        assert!(Episode::new(snapshot.clone(), 0, 1, dir_path().child("1"), &probe(), None).is_none());
        assert!(Episode::new(snapshot, 1, 0, dir_path().child("0"), &probe(), None).is_none());
    }

    #[test]
    fn image_is_probed_once_and_shared_between_clones() {
        let fixed = Arc::new(FixedProbe::default());
        let image = ImageRef::new("https://a/cover.jpg", fixed.clone());
        let copy = image.clone();

        assert_eq!(image.info().width, 600);
        assert_eq!(copy.info().mime_type, "image/jpeg");
        assert_eq!(fixed.calls(), 1);
    }

    #[test]
    fn failed_probe_is_absorbed() {
        let image = ImageRef::new("https://a/broken.png", probe());
        let node = ImageNode::new(image, dir_path().child("0"));

        assert_eq!((node.width(), node.height()), (0, 0));
        assert_eq!(node.mime_type().unwrap(), "image/png");
        assert_eq!(node.urls().unwrap(), ["https://a/broken.png"]);
        assert_eq!(node.object_type(), TYPE_IMAGE);
    }
}

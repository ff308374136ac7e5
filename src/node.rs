//! Container nodes: the server root and one directory per podcast.
//!
//! Containers never keep the feeds they list. Every count and listing asks
//! the [`FeedCache`] for the current snapshot and computes child addresses
//! from the children's position (or content hash) in that snapshot, so two
//! calls separated by a refresh may describe different objects at the same
//! address.

use std::ops::Range;
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::address::{Address, AddressScheme};
use crate::cache::{FeedCache, FeedSnapshot};
use crate::error::TreeError;
use crate::model::{
    count, fields, Entry, Episode, ImageNode, ImageRef, MediaItem, MediaObject, TYPE_AUDIO,
    TYPE_CONTAINER,
};
use crate::probe::ImageProbe;
use crate::source::Feed;

/// Everything a node needs to reach the current tree.
pub struct TreeContext {
    pub cache: Arc<FeedCache>,
    pub scheme: AddressScheme,
    pub probe: Arc<dyn ImageProbe>,
}

/// The `MediaContainer2` role.
///
/// The listing calls take a `filter` naming the fields the caller wants.
/// It is accepted and ignored: every entry always carries the full field
/// set.
pub trait MediaContainer: MediaObject {
    fn child_count(&self) -> Result<u32, TreeError>;

    fn item_count(&self) -> Result<u32, TreeError>;

    fn container_count(&self) -> Result<u32, TreeError>;

    fn searchable(&self) -> bool {
        false
    }

    fn list_children(
        &self,
        offset: u32,
        max: u32,
        filter: &[String],
    ) -> Result<Vec<Entry>, TreeError>;

    fn list_containers(
        &self,
        offset: u32,
        max: u32,
        filter: &[String],
    ) -> Result<Vec<Entry>, TreeError>;

    fn list_items(
        &self,
        offset: u32,
        max: u32,
        filter: &[String],
    ) -> Result<Vec<Entry>, TreeError>;
}

/// The slice `[offset, offset + max)` of a collection of `len` entries,
/// clamped to the collection. Every empty window is `0..0`.
pub fn page(len: usize, offset: u32, max: u32) -> Range<usize> {
    let start = usize::try_from(offset).unwrap_or(usize::MAX);
    if start >= len || max == 0 {
        return 0..0;
    }
    let end = start
        .saturating_add(usize::try_from(max).unwrap_or(usize::MAX))
        .min(len);
    start..end
}

/// The closed set of objects that make up the tree.
#[derive(Clone)]
pub enum Node {
    Root(Arc<RootDirectory>),
    Podcast(Arc<PodcastDirectory>),
    Episode(Arc<EpisodeNode>),
    Image(Arc<ImageNode>),
}

impl Node {
    pub fn path(&self) -> &Address {
        match self {
            Node::Root(n) => n.path(),
            Node::Podcast(n) => n.path(),
            Node::Episode(n) => n.path(),
            Node::Image(n) => n.path(),
        }
    }
}

// ---------------------------------------------------------------------------
// Root
// ---------------------------------------------------------------------------

/// Top-level container listing one directory per podcast.
pub struct RootDirectory {
    ctx: Arc<TreeContext>,
    path: Address,
    display_name: String,
}

impl RootDirectory {
    pub fn new(ctx: Arc<TreeContext>, path: Address, display_name: impl Into<String>) -> Self {
        Self {
            ctx,
            path,
            display_name: display_name.into(),
        }
    }

    /// A fresh directory node for every podcast in the current snapshot.
    pub fn podcasts(&self) -> Result<Vec<PodcastDirectory>, TreeError> {
        let snapshot = self.ctx.cache.snapshot()?;
        let feeds = snapshot.feeds();
        Ok((0..feeds.len())
            .map(|index| {
                let path = self.ctx.scheme.child(&self.path, feeds, index);
                PodcastDirectory::new(Arc::clone(&self.ctx), path, self.path.clone())
            })
            .collect())
    }

    fn directory_entry(&self, feeds: &[Feed], index: usize) -> Entry {
        let feed = &feeds[index];
        let mut entry = Entry::new();
        let items = count(feed.items.len());
        entry.insert(fields::PARENT.into(), self.path.clone().into());
        entry.insert(fields::TYPE.into(), TYPE_CONTAINER.into());
        entry.insert(
            fields::PATH.into(),
            self.ctx.scheme.child(&self.path, feeds, index).into(),
        );
        entry.insert(fields::DISPLAY_NAME.into(), feed.display_name().into());
        entry.insert(fields::CHILD_COUNT.into(), items.into());
        entry.insert(fields::ITEM_COUNT.into(), items.into());
        entry.insert(fields::CONTAINER_COUNT.into(), 0u32.into());
        entry.insert(fields::SEARCHABLE.into(), false.into());
        entry
    }
}

impl MediaObject for RootDirectory {
    fn parent(&self) -> Address {
        self.path.clone()
    }

    fn object_type(&self) -> &'static str {
        TYPE_CONTAINER
    }

    fn path(&self) -> &Address {
        &self.path
    }

    fn display_name(&self) -> Result<String, TreeError> {
        Ok(self.display_name.clone())
    }
}

impl MediaContainer for RootDirectory {
    fn child_count(&self) -> Result<u32, TreeError> {
        self.container_count()
    }

    fn item_count(&self) -> Result<u32, TreeError> {
        Ok(0)
    }

    fn container_count(&self) -> Result<u32, TreeError> {
        Ok(count(self.ctx.cache.snapshot()?.len()))
    }

    fn list_children(
        &self,
        offset: u32,
        max: u32,
        filter: &[String],
    ) -> Result<Vec<Entry>, TreeError> {
        self.list_containers(offset, max, filter)
    }

    fn list_containers(
        &self,
        offset: u32,
        max: u32,
        _filter: &[String],
    ) -> Result<Vec<Entry>, TreeError> {
        let snapshot = self.ctx.cache.snapshot()?;
        let feeds = snapshot.feeds();
        Ok(page(feeds.len(), offset, max)
            .map(|index| self.directory_entry(feeds, index))
            .collect())
    }

    fn list_items(
        &self,
        _offset: u32,
        _max: u32,
        _filter: &[String],
    ) -> Result<Vec<Entry>, TreeError> {
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// Podcast directories
// ---------------------------------------------------------------------------

/// Container listing the episodes of one podcast.
///
/// The podcast is identified by the last segment of the directory's
/// address and looked up again in the current snapshot on every query. If
/// it is no longer there, the directory reads as empty.
pub struct PodcastDirectory {
    ctx: Arc<TreeContext>,
    path: Address,
    parent: Address,
    art: OnceLock<Option<ImageRef>>,
}

impl PodcastDirectory {
    pub fn new(ctx: Arc<TreeContext>, path: Address, parent: Address) -> Self {
        Self {
            ctx,
            path,
            parent,
            art: OnceLock::new(),
        }
    }

    /// Run `f` against this directory's feed in the current snapshot.
    fn with_feed<R>(
        &self,
        f: impl FnOnce(&Arc<FeedSnapshot>, usize, &Feed) -> R,
    ) -> Result<Option<R>, TreeError> {
        let snapshot = self.ctx.cache.snapshot()?;
        let segment = self.path.last_segment().unwrap_or_default();
        match self.ctx.scheme.locate(snapshot.feeds(), segment) {
            Some((index, feed)) => Ok(Some(f(&snapshot, index, feed))),
            None => {
                debug!(path = %self.path, "podcast no longer in snapshot");
                Ok(None)
            }
        }
    }

    /// Podcast artwork, resolved from the feed the first time it is asked
    /// for and kept for the life of this node.
    fn art_for(&self, feed: &Feed) -> Option<ImageRef> {
        self.art
            .get_or_init(|| {
                feed.image
                    .as_ref()
                    .map(|url| ImageRef::new(url.clone(), Arc::clone(&self.ctx.probe)))
            })
            .clone()
    }

    pub fn album_art(&self) -> Result<Option<ImageRef>, TreeError> {
        Ok(self.with_feed(|_, _, feed| self.art_for(feed))?.flatten())
    }

    fn episode(
        &self,
        snapshot: &Arc<FeedSnapshot>,
        feed_index: usize,
        item_index: usize,
    ) -> Option<Episode> {
        let feed = snapshot.feeds().get(feed_index)?;
        if item_index >= feed.items.len() {
            return None;
        }
        let path = self.ctx.scheme.child(&self.path, &feed.items, item_index);
        Episode::new(
            Arc::clone(snapshot),
            feed_index,
            item_index,
            path,
            &self.ctx.probe,
            self.art_for(feed),
        )
    }

    /// Views of every episode in the current snapshot.
    pub fn episodes(&self) -> Result<Vec<Episode>, TreeError> {
        let episodes: Option<Vec<Episode>> = self.with_feed(|snapshot, feed_index, feed| {
            (0..feed.items.len())
                .filter_map(|i| self.episode(snapshot, feed_index, i))
                .collect()
        })?;
        Ok(episodes.unwrap_or_default())
    }

    /// The episode `segment` names in the current snapshot, if any.
    pub fn episode_at(&self, segment: &str) -> Result<Option<Episode>, TreeError> {
        let found = self.with_feed(|snapshot, feed_index, feed| {
            let (item_index, _) = self.ctx.scheme.locate(&feed.items, segment)?;
            self.episode(snapshot, feed_index, item_index)
        })?;
        Ok(found.flatten())
    }

    fn item_len(&self) -> Result<usize, TreeError> {
        Ok(self
            .with_feed(|_, _, feed| feed.items.len())?
            .unwrap_or_default())
    }
}

impl MediaObject for PodcastDirectory {
    fn parent(&self) -> Address {
        self.parent.clone()
    }

    fn object_type(&self) -> &'static str {
        TYPE_CONTAINER
    }

    fn path(&self) -> &Address {
        &self.path
    }

    fn display_name(&self) -> Result<String, TreeError> {
        self.with_feed(|_, _, feed| feed.display_name().to_string())?
            .ok_or_else(|| TreeError::ObjectGone(self.path.clone()))
    }
}

impl MediaContainer for PodcastDirectory {
    fn child_count(&self) -> Result<u32, TreeError> {
        self.item_count()
    }

    fn item_count(&self) -> Result<u32, TreeError> {
        Ok(count(self.item_len()?))
    }

    fn container_count(&self) -> Result<u32, TreeError> {
        Ok(0)
    }

    fn list_children(
        &self,
        offset: u32,
        max: u32,
        filter: &[String],
    ) -> Result<Vec<Entry>, TreeError> {
        self.list_items(offset, max, filter)
    }

    fn list_containers(
        &self,
        _offset: u32,
        _max: u32,
        _filter: &[String],
    ) -> Result<Vec<Entry>, TreeError> {
        Ok(Vec::new())
    }

    fn list_items(
        &self,
        offset: u32,
        max: u32,
        _filter: &[String],
    ) -> Result<Vec<Entry>, TreeError> {
        let entries: Option<Vec<Entry>> = self.with_feed(|snapshot, feed_index, feed| {
            page(feed.items.len(), offset, max)
                .filter_map(|i| self.episode(snapshot, feed_index, i))
                .map(|episode| episode.listing_entry())
                .collect()
        })?;
        Ok(entries.unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Exported episodes
// ---------------------------------------------------------------------------

/// An episode registered on the bus.
///
/// Holds its address and its directory, never a snapshot: every read
/// locates the item again, so the episode follows refreshes the same way
/// its directory does and reports [`TreeError::ObjectGone`] once the item
/// is no longer there.
pub struct EpisodeNode {
    directory: Arc<PodcastDirectory>,
    path: Address,
    parent: Address,
    art_path: Option<Address>,
}

impl EpisodeNode {
    /// Register-time handle for `episode`, a view produced by `directory`.
    pub fn new(directory: Arc<PodcastDirectory>, episode: &Episode) -> Self {
        Self {
            path: episode.path().clone(),
            parent: directory.path().clone(),
            art_path: episode.art_node().map(|art| art.path().clone()),
            directory,
        }
    }

    fn current(&self) -> Result<Episode, TreeError> {
        let segment = self.path.last_segment().unwrap_or_default();
        self.directory
            .episode_at(segment)?
            .ok_or_else(|| TreeError::ObjectGone(self.path.clone()))
    }

    pub fn artist(&self) -> Result<String, TreeError> {
        Ok(self.current()?.artist().to_string())
    }

    pub fn album(&self) -> Result<String, TreeError> {
        Ok(self.current()?.album().to_string())
    }

    pub fn date(&self) -> Result<String, TreeError> {
        Ok(self.current()?.date().to_string())
    }

    /// Address of the artwork node exported alongside this episode.
    pub fn art_path(&self) -> Option<&Address> {
        self.art_path.as_ref()
    }
}

impl MediaObject for EpisodeNode {
    fn parent(&self) -> Address {
        self.parent.clone()
    }

    /// Falls back to `audio` while the item is missing.
    fn object_type(&self) -> &'static str {
        self.current()
            .map(|episode| episode.object_type())
            .unwrap_or(TYPE_AUDIO)
    }

    fn path(&self) -> &Address {
        &self.path
    }

    fn display_name(&self) -> Result<String, TreeError> {
        self.current()?.display_name()
    }
}

impl MediaItem for EpisodeNode {
    fn urls(&self) -> Result<Vec<String>, TreeError> {
        self.current()?.urls()
    }

    fn mime_type(&self) -> Result<String, TreeError> {
        self.current()?.mime_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::AddressMode;
    use crate::model::Value;
    use crate::source::{make_feed, make_item};
    use crate::testing::{cache_over, FixedProbe, ManualClock, ScriptedSource};
    use std::time::Duration;

    fn tree(source: &Arc<ScriptedSource>, mode: AddressMode) -> RootDirectory {
        let ctx = Arc::new(TreeContext {
            cache: cache_over(source),
            scheme: AddressScheme::new(mode),
            probe: Arc::new(FixedProbe::default()),
        });
        RootDirectory::new(ctx, Address::root("Podcasts").unwrap(), "Podcasts")
    }

    fn names(entries: &[Entry]) -> Vec<&str> {
        entries
            .iter()
            .map(|e| e[fields::DISPLAY_NAME].as_str().unwrap())
            .collect()
    }

    fn two_feeds() -> Arc<ScriptedSource> {
        Arc::new(ScriptedSource::repeating(vec![
            make_feed("A", &["a1", "a2", "a3"]),
            make_feed("B", &[]),
        ]))
    }

    #[test]
    fn page_clamps_to_the_collection() {
        assert_eq!(page(10, 0, 3), 0..3);
        assert_eq!(page(10, 8, 5), 8..10);
        assert_eq!(page(10, 10, 5), 0..0);
        assert_eq!(page(10, u32::MAX, u32::MAX), 0..0);
        assert_eq!(page(10, 9, u32::MAX), 9..10);
        assert_eq!(page(10, 3, 0), 0..0);
        assert_eq!(page(0, 0, 10), 0..0);
    }

    #[test]
    fn page_length_matches_the_window_formula() {
        for len in 0..6usize {
            for offset in 0..8u32 {
                for max in 0..8u32 {
                    let expected = if (offset as usize) < len {
                        (max as usize).min(len - offset as usize)
                    } else {
                        0
                    };
                    assert_eq!(page(len, offset, max).len(), expected, "len={len} offset={offset} max={max}");
                }
            }
        }
    }

    #[test]
    fn root_lists_one_container_per_feed() {
        let root = tree(&two_feeds(), AddressMode::Positional);

        assert_eq!(root.child_count().unwrap(), 2);
        assert_eq!(root.container_count().unwrap(), 2);
        assert_eq!(root.item_count().unwrap(), 0);
        assert!(!root.searchable());
        assert_eq!(root.parent(), root.path().clone(), "root is its own parent");

        let all = root.list_children(0, 10, &[]).unwrap();
        assert_eq!(names(&all), ["A", "B"]);
        assert_eq!(all[0][fields::ITEM_COUNT], Value::U32(3));
        assert_eq!(all[1][fields::ITEM_COUNT], Value::U32(0));
        assert_eq!(all[0][fields::TYPE], Value::Str("container".into()));
        assert_eq!(all[1][fields::PARENT], Value::Path(root.path().clone()));
        assert_eq!(
            all[1][fields::PATH].as_str(),
            Some("/org/gnome/UPnP/MediaServer2/Podcasts/1")
        );

        assert_eq!(names(&root.list_children(1, 10, &[]).unwrap()), ["B"]);
        assert!(root.list_children(5, 10, &[]).unwrap().is_empty());
        assert_eq!(root.list_containers(0, 10, &[]).unwrap(), all);
        assert!(root.list_items(0, 10, &[]).unwrap().is_empty());
    }

    #[test]
    fn filter_is_ignored() {
        let root = tree(&two_feeds(), AddressMode::Positional);
        let filtered = root
            .list_children(0, 10, &[fields::DISPLAY_NAME.to_string()])
            .unwrap();
        assert_eq!(filtered, root.list_children(0, 10, &[]).unwrap());
        assert!(filtered[0].contains_key(fields::CHILD_COUNT));
    }

    #[test]
    fn podcast_directory_pages_its_items() {
        let source = Arc::new(ScriptedSource::repeating(vec![make_feed("Show", &["X", "Y"])]));
        let root = tree(&source, AddressMode::Positional);
        let dir = root.podcasts().unwrap().remove(0);

        assert_eq!(dir.display_name().unwrap(), "Show");
        assert_eq!(dir.child_count().unwrap(), 2);
        assert_eq!(dir.item_count().unwrap(), 2);
        assert_eq!(dir.container_count().unwrap(), 0);
        assert_eq!(dir.parent(), root.path().clone());

        assert_eq!(names(&dir.list_items(0, 1, &[]).unwrap()), ["X"]);
        assert_eq!(names(&dir.list_items(1, 1, &[]).unwrap()), ["Y"]);
        assert!(dir.list_items(2, 1, &[]).unwrap().is_empty());
        assert!(dir.list_containers(0, 10, &[]).unwrap().is_empty());
        assert_eq!(dir.list_children(0, 10, &[]).unwrap(), dir.list_items(0, 10, &[]).unwrap());
    }

    #[test]
    fn item_entries_carry_absolute_addresses_and_playable_fields() {
        let source = Arc::new(ScriptedSource::repeating(vec![make_feed("Show", &["X", "Y", "Z"])]));
        let root = tree(&source, AddressMode::Positional);
        let dir = root.podcasts().unwrap().remove(0);

        let entries = dir.list_items(2, 5, &[]).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry[fields::PATH], Value::Path(dir.path().child("2")));
        assert_eq!(entry[fields::PARENT], Value::Path(dir.path().clone()));
        assert_eq!(entry[fields::TYPE], Value::Str(TYPE_AUDIO.into()));
        assert_eq!(
            entry[fields::URLS],
            Value::StrList(vec!["https://cdn.example.com/Z.mp3".into()])
        );
        assert_eq!(entry[fields::MIME_TYPE], Value::Str("audio/mpeg".into()));
        assert_eq!(entry[fields::ALBUM], Value::Str("Show".into()));
    }

    #[test]
    fn item_without_enclosures_is_listed_without_mime_type() {
        let mut feed = make_feed("Show", &["X"]);
        feed.items.push(make_item("Trailer", &[]));
        let source = Arc::new(ScriptedSource::repeating(vec![feed]));
        let dir = tree(&source, AddressMode::Positional).podcasts().unwrap().remove(0);

        let entries = dir.list_items(0, 10, &[]).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(!entries[1].contains_key(fields::MIME_TYPE));
    }

    #[test]
    fn directory_follows_refreshes_and_empties_when_its_feed_vanishes() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(vec![make_feed("A", &["a1"]), make_feed("B", &["b1", "b2"])]),
            Ok(vec![make_feed("A", &["a1", "a2"])]),
        ]));
        let clock = Arc::new(ManualClock::new());
        let ctx = Arc::new(TreeContext {
            cache: Arc::new(FeedCache::with_clock(source.clone(), Duration::from_secs(60), clock.clone())),
            scheme: AddressScheme::default(),
            probe: Arc::new(FixedProbe::default()),
        });
        let root = RootDirectory::new(ctx, Address::root("Podcasts").unwrap(), "Podcasts");
        let dirs = root.podcasts().unwrap();
        assert_eq!(dirs[1].item_count().unwrap(), 2);

        clock.advance(Duration::from_secs(61));

        assert_eq!(dirs[0].item_count().unwrap(), 2, "A gained an episode");
        assert_eq!(dirs[1].item_count().unwrap(), 0, "B failed this round");
        assert!(dirs[1].list_items(0, 10, &[]).unwrap().is_empty());
        assert!(matches!(dirs[1].display_name(), Err(TreeError::ObjectGone(_))));
        assert_eq!(root.child_count().unwrap(), 1);
    }

    #[test]
    fn total_failure_surfaces_on_listing_calls() {
        let source = Arc::new(ScriptedSource::new(vec![Err(anyhow::anyhow!("offline"))]));
        let root = tree(&source, AddressMode::Positional);
        assert!(matches!(
            root.list_children(0, 10, &[]),
            Err(TreeError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn content_hash_directories_survive_reordering() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(vec![make_feed("A", &["a1"]), make_feed("B", &["b1", "b2"])]),
            Ok(vec![make_feed("B", &["b1", "b2"]), make_feed("A", &["a1"])]),
        ]));
        let clock = Arc::new(ManualClock::new());
        let ctx = Arc::new(TreeContext {
            cache: Arc::new(FeedCache::with_clock(source.clone(), Duration::from_secs(60), clock.clone())),
            scheme: AddressScheme::new(AddressMode::ContentHash),
            probe: Arc::new(FixedProbe::default()),
        });
        let root = RootDirectory::new(ctx, Address::root("Podcasts").unwrap(), "Podcasts");
        let b = root.podcasts().unwrap().remove(1);
        assert_eq!(b.display_name().unwrap(), "B");

        clock.advance(Duration::from_secs(61));
        assert_eq!(b.display_name().unwrap(), "B", "still B after B moved to the front");
        assert_eq!(b.item_count().unwrap(), 2);
    }

    #[test]
    fn directory_art_is_resolved_once_per_node() {
        let mut feed = make_feed("Show", &["X", "Y"]);
        feed.image = Some("https://example.com/show.jpg".into());
        let source = Arc::new(ScriptedSource::repeating(vec![feed]));
        let root = tree(&source, AddressMode::Positional);
        let dir = root.podcasts().unwrap().remove(0);

        let art = dir.album_art().unwrap().unwrap();
        let episodes = dir.episodes().unwrap();
        assert_eq!(episodes.len(), 2);
        assert!(episodes.iter().all(|e| e.album_art().unwrap().same_as(&art)));

        let recreated = root.podcasts().unwrap().remove(0);
        assert!(
            !recreated.album_art().unwrap().unwrap().same_as(&art),
            "a new directory node starts with an empty art cache"
        );
    }
}

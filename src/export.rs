//! Registers the tree on an [`ObjectBus`].
//!
//! The walk is depth-first: the root, then each podcast directory followed
//! by its episodes and their artwork. It runs against whatever snapshot the
//! cache holds at that moment; later refreshes show up through listing
//! calls but not as new registrations until [`reexport_tree`] is called.

use std::sync::Arc;

use tracing::{debug, info};

use crate::bus::{
    listing_args, MethodTable, ObjectBus, PropertySet, CONTAINER_INTERFACE, ITEM_INTERFACE,
    OBJECT_INTERFACE,
};
use crate::error::BusError;
use crate::model::{fields, ImageNode, MediaItem, MediaObject, Value};
use crate::node::{EpisodeNode, MediaContainer, Node, RootDirectory};

pub const LIST_CHILDREN: &str = "ListChildren";
pub const LIST_CONTAINERS: &str = "ListContainers";
pub const LIST_ITEMS: &str = "ListItems";

/// What one walk registered.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
    pub podcasts: usize,
    pub episodes: usize,
    pub images: usize,
}

/// Register the whole tree below and including `root`.
///
/// Any registration failure aborts the walk; there is no partial tree.
pub fn export_tree(
    bus: &dyn ObjectBus,
    root: &Arc<RootDirectory>,
) -> Result<ExportSummary, BusError> {
    register(bus, &Node::Root(Arc::clone(root)))?;
    info!(path = %root.path(), "exported root container");
    export_children(bus, root)
}

/// Drop every registration below `root` and walk the current snapshot
/// again. The root's own registration is kept.
pub fn reexport_tree(
    bus: &dyn ObjectBus,
    root: &Arc<RootDirectory>,
) -> Result<ExportSummary, BusError> {
    let removed = bus.unexport_below(root.path());
    debug!(removed, "cleared previous registrations");
    export_children(bus, root)
}

fn export_children(bus: &dyn ObjectBus, root: &RootDirectory) -> Result<ExportSummary, BusError> {
    let mut summary = ExportSummary::default();

    for podcast in root.podcasts()? {
        let podcast = Arc::new(podcast);
        register(bus, &Node::Podcast(Arc::clone(&podcast)))?;
        summary.podcasts += 1;

        let episodes = podcast.episodes()?;
        let mut exported = 0;
        for episode in episodes {
            let art = episode.art_node();
            let node = EpisodeNode::new(Arc::clone(&podcast), &episode);
            register(bus, &Node::Episode(Arc::new(node)))?;
            exported += 1;
            if let Some(art) = art {
                register(bus, &Node::Image(Arc::new(art)))?;
                summary.images += 1;
            }
        }
        summary.episodes += exported;
        info!(
            podcast = %podcast.display_name()?,
            path = %podcast.path(),
            episodes = exported,
            "exported podcast"
        );
    }

    info!(
        podcasts = summary.podcasts,
        episodes = summary.episodes,
        images = summary.images,
        "finished exporting tree"
    );
    Ok(summary)
}

fn register(bus: &dyn ObjectBus, node: &Node) -> Result<(), BusError> {
    let path = node.path().clone();
    match node {
        Node::Root(root) => {
            bus.export(&path, container_properties(root))?;
            bus.export_methods(&path, CONTAINER_INTERFACE, container_methods(root))?;
        }
        Node::Podcast(podcast) => {
            bus.export(&path, container_properties(podcast))?;
            bus.export_methods(&path, CONTAINER_INTERFACE, container_methods(podcast))?;
        }
        Node::Episode(episode) => bus.export(&path, episode_properties(episode))?,
        Node::Image(image) => bus.export(&path, image_properties(image))?,
    }
    debug!(%path, "registered object");
    Ok(())
}

fn object_properties<O>(object: &Arc<O>) -> PropertySet
where
    O: MediaObject + Send + Sync + 'static,
{
    let name = Arc::clone(object);
    let kind = Arc::clone(object);
    PropertySet::new()
        .constant(OBJECT_INTERFACE, fields::PARENT, object.parent())
        .with(OBJECT_INTERFACE, fields::TYPE, move || Ok(kind.object_type().into()))
        .constant(OBJECT_INTERFACE, fields::PATH, object.path().clone())
        .with(OBJECT_INTERFACE, fields::DISPLAY_NAME, move || {
            Ok(name.display_name()?.into())
        })
}

fn container_properties<C>(container: &Arc<C>) -> PropertySet
where
    C: MediaContainer + Send + Sync + 'static,
{
    let children = Arc::clone(container);
    let items = Arc::clone(container);
    let containers = Arc::clone(container);
    object_properties(container)
        .with(CONTAINER_INTERFACE, fields::CHILD_COUNT, move || {
            Ok(children.child_count()?.into())
        })
        .with(CONTAINER_INTERFACE, fields::ITEM_COUNT, move || {
            Ok(items.item_count()?.into())
        })
        .with(CONTAINER_INTERFACE, fields::CONTAINER_COUNT, move || {
            Ok(containers.container_count()?.into())
        })
        .constant(CONTAINER_INTERFACE, fields::SEARCHABLE, container.searchable())
}

fn container_methods<C>(container: &Arc<C>) -> MethodTable
where
    C: MediaContainer + Send + Sync + 'static,
{
    let children = Arc::clone(container);
    let containers = Arc::clone(container);
    let items = Arc::clone(container);
    MethodTable::new()
        .with(LIST_CHILDREN, move |args| {
            let (offset, max, filter) = listing_args(LIST_CHILDREN, args)?;
            Ok(Value::Entries(children.list_children(offset, max, &filter)?))
        })
        .with(LIST_CONTAINERS, move |args| {
            let (offset, max, filter) = listing_args(LIST_CONTAINERS, args)?;
            Ok(Value::Entries(containers.list_containers(offset, max, &filter)?))
        })
        .with(LIST_ITEMS, move |args| {
            let (offset, max, filter) = listing_args(LIST_ITEMS, args)?;
            Ok(Value::Entries(items.list_items(offset, max, &filter)?))
        })
}

fn item_properties<I>(item: &Arc<I>) -> PropertySet
where
    I: MediaItem + Send + Sync + 'static,
{
    let urls = Arc::clone(item);
    let mime = Arc::clone(item);
    object_properties(item)
        .with(ITEM_INTERFACE, fields::URLS, move || Ok(urls.urls()?.into()))
        .with(ITEM_INTERFACE, fields::MIME_TYPE, move || {
            Ok(mime.mime_type()?.into())
        })
}

fn episode_properties(episode: &Arc<EpisodeNode>) -> PropertySet {
    let artist = Arc::clone(episode);
    let album = Arc::clone(episode);
    let date = Arc::clone(episode);
    let props = item_properties(episode)
        .with(ITEM_INTERFACE, fields::ARTIST, move || Ok(artist.artist()?.into()))
        .with(ITEM_INTERFACE, fields::ALBUM, move || Ok(album.album()?.into()))
        .with(ITEM_INTERFACE, fields::DATE, move || Ok(date.date()?.into()));
    match episode.art_path() {
        Some(art) => props.constant(ITEM_INTERFACE, fields::ALBUM_ART, art.clone()),
        None => props,
    }
}

fn image_properties(image: &Arc<ImageNode>) -> PropertySet {
    let width = Arc::clone(image);
    let height = Arc::clone(image);
    item_properties(image)
        .with(ITEM_INTERFACE, fields::WIDTH, move || Ok(width.width().into()))
        .with(ITEM_INTERFACE, fields::HEIGHT, move || Ok(height.height().into()))
        .constant(ITEM_INTERFACE, fields::DEPTH, image.depth())
}

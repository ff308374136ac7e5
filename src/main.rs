//! podtree — publishes podcast feeds as a MediaServer2 object tree.
//!
//! ## Architecture overview
//!
//! ```text
//! ┌──────────┐ fetch_all ┌──────────┐ snapshot() ┌──────────┐ export ┌──────────┐
//! │ source/  │ ────────► │ cache.rs │ ─────────► │ node.rs  │ ─────► │  bus.rs  │
//! │  (RSS)   │           │  (TTL)   │            │ model.rs │        │ (calls)  │
//! └──────────┘           └──────────┘            └──────────┘        └──────────┘
//!                                                     ▲
//!                                                     │ child addresses
//!                                                ┌────────────┐
//!                                                │ address.rs │
//!                                                └────────────┘
//! ```
//!
//! * **`source/`** — the `FeedSource` trait, feed data types and the RSS
//!   implementation.
//! * **`probe`** — resolves artwork URLs to dimensions and MIME type.
//! * **`cache`** — serves the last fetched feeds until their TTL runs out.
//! * **`address`** — object paths for directories, episodes and artwork.
//! * **`model`** — episode and image views, property values.
//! * **`node`** — the root and podcast containers with paginated listings.
//! * **`bus`** — the registration surface and an in-process dispatcher.
//! * **`export`** — walks the tree and registers every node on the bus.
//! * **`main`** — wires everything together: parse args, load config,
//!   export, then serve until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use podtree::address::{service_name, Address, AddressScheme};
use podtree::bus::{LocalBus, CONTAINER_INTERFACE};
use podtree::cache::FeedCache;
use podtree::config::Config;
use podtree::export::{self, LIST_CHILDREN};
use podtree::model::{fields, Entry, MediaObject, Value, TYPE_CONTAINER};
use podtree::node::{RootDirectory, TreeContext};
use podtree::probe::HttpImageProbe;
use podtree::source::RssFeedSource;

#[derive(Parser)]
#[command(name = "podtree", version)]
#[command(about = "Publishes podcast feeds as a browsable MediaServer2 object tree")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "PODTREE_CONFIG", default_value = "feeds.yaml")]
    config: PathBuf,

    /// Log level, used when RUST_LOG is not set
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Print the exported tree as JSON lines and exit
    #[arg(long)]
    dump: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("podtree={}", cli.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting podtree v{}", env!("CARGO_PKG_VERSION"));

    // -- configuration -------------------------------------------------------
    let config = Config::load(&cli.config)?;
    info!(
        config = %cli.config.display(),
        feeds = config.feeds.len(),
        refresh_secs = config.refresh_interval_secs,
        addressing = ?config.addressing,
        "configuration loaded"
    );

    // -- collaborators -------------------------------------------------------
    let source = RssFeedSource::new(config.feeds.clone(), config.fetch_timeout())?;
    let probe = HttpImageProbe::new(config.fetch_timeout())?;
    let cache = FeedCache::new(Arc::new(source), config.refresh_interval());
    info!(ttl_secs = cache.ttl().as_secs(), "feed cache ready");

    let ctx = Arc::new(TreeContext {
        cache: Arc::new(cache),
        scheme: AddressScheme::new(config.addressing),
        probe: Arc::new(probe),
    });
    let root_path = Address::root(&config.app_name)?;
    let root = Arc::new(RootDirectory::new(ctx, root_path, config.app_name.clone()));

    // -- export (any failure here is fatal) ----------------------------------
    let bus = LocalBus::new(service_name(&config.app_name));
    let summary = export::export_tree(&bus, &root).context("exporting object tree")?;
    info!(
        service = bus.service_name(),
        objects = bus.len(),
        podcasts = summary.podcasts,
        episodes = summary.episodes,
        "object tree exported"
    );

    if cli.dump {
        return dump(&bus, root.path());
    }

    serve_until_shutdown()
}

/// Block until SIGINT / Ctrl-C. Inbound calls are handled by whichever
/// transport holds the bus; this only owns the process lifetime.
fn serve_until_shutdown() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building signal runtime")?;
    runtime
        .block_on(tokio::signal::ctrl_c())
        .context("waiting for shutdown signal")?;
    info!("shutdown signal received, exiting");
    Ok(())
}

/// Walk the tree through `ListChildren` calls and print every entry.
fn dump(bus: &LocalBus, root: &Address) -> Result<()> {
    for entry in walk(bus, root)? {
        println!("{}", serde_json::to_string(&entry)?);
    }
    Ok(())
}

/// Every entry below `root`, each container's children right after it.
fn walk(bus: &LocalBus, root: &Address) -> Result<Vec<Entry>> {
    let mut out = Vec::new();
    let mut pending = vec![root.clone()];
    while let Some(container) = pending.pop() {
        let args = [
            Value::U32(0),
            Value::U32(u32::MAX),
            Value::StrList(Vec::new()),
        ];
        let entries = bus
            .call(container.as_str(), CONTAINER_INTERFACE, LIST_CHILDREN, &args)?
            .into_entries()
            .unwrap_or_default();
        for entry in entries.iter().rev() {
            if entry.get(fields::TYPE).and_then(Value::as_str) == Some(TYPE_CONTAINER) {
                if let Some(Value::Path(path)) = entry.get(fields::PATH) {
                    pending.push(path.clone());
                }
            }
        }
        out.extend(entries);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use podtree::node::MediaContainer;
    use podtree::probe::{ImageInfo, ImageProbe};
    use podtree::source::{Enclosure, Feed, FeedSource, Item};
    use std::time::Duration;

    struct OneShow;

    impl FeedSource for OneShow {
        fn fetch_all(&self) -> Result<Vec<Feed>> {
            let item = |title: &str| Item {
                title: title.to_string(),
                published: String::new(),
                author: "Host".to_string(),
                enclosures: vec![Enclosure {
                    url: format!("https://cdn.example.com/{title}.mp3"),
                    mime_type: "audio/mpeg".to_string(),
                }],
                image: None,
            };
            Ok(vec![Feed {
                name: "show".to_string(),
                url: "https://feeds.example.com/show".to_string(),
                title: "Show".to_string(),
                items: vec![item("one"), item("two")],
                image: None,
            }])
        }
    }

    struct NoImages;

    impl ImageProbe for NoImages {
        fn inspect(&self, url: &str) -> Result<ImageInfo> {
            anyhow::bail!("unexpected probe of {url}")
        }
    }

    #[test]
    fn walk_lists_each_container_before_its_children() {
        let ctx = Arc::new(TreeContext {
            cache: Arc::new(FeedCache::new(Arc::new(OneShow), Duration::from_secs(60))),
            scheme: AddressScheme::default(),
            probe: Arc::new(NoImages),
        });
        let root = Arc::new(RootDirectory::new(ctx, Address::root("Podcasts").unwrap(), "Podcasts"));
        let bus = LocalBus::new(service_name("Podcasts"));
        export::export_tree(&bus, &root).unwrap();

        let entries = walk(&bus, root.path()).unwrap();
        let names: Vec<_> = entries
            .iter()
            .map(|e| e[fields::DISPLAY_NAME].as_str().unwrap())
            .collect();
        assert_eq!(names, ["Show", "one", "two"]);
        assert_eq!(root.child_count().unwrap(), 1);
    }
}

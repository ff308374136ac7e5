//! Service configuration, read from a YAML file.
//!
//! ```yaml
//! app_name: Podcasts
//! refresh_interval_secs: 900
//! feeds:
//!   - name: Example
//!     url: https://example.com/feed.xml
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::address::{sanitize_segment, AddressMode};
use crate::source::FeedEndpoint;

const DEFAULT_APP_NAME: &str = "Podcasts";
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 900;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Display name of the root container; also names the bus service and
    /// the root object path.
    pub app_name: String,

    /// How long a fetched set of feeds is served before the next read
    /// refetches it.
    pub refresh_interval_secs: u64,

    /// Per-request HTTP timeout for feeds and artwork.
    pub fetch_timeout_secs: u64,

    pub addressing: AddressMode,

    /// Feeds in the order they appear under the root.
    pub feeds: Vec<FeedEndpoint>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            addressing: AddressMode::default(),
            feeds: Vec::new(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml(&contents).with_context(|| format!("in config file {}", path.display()))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(contents).context("parsing YAML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if sanitize_segment(&self.app_name).is_empty() {
            bail!("app_name must not be empty");
        }
        if let Some(feed) = self.feeds.iter().find(|f| f.url.trim().is_empty()) {
            bail!("feed {:?} has no url", feed.name);
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

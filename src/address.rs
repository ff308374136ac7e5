//! Hierarchical object addresses.
//!
//! Every exported object lives at a bus object path below the server root,
//! `/org/gnome/UPnP/MediaServer2/<App>`. Podcast directories hang off the
//! root and episodes off their directory, one path segment per level.
//!
//! By default a child's segment is its position in the enumeration that
//! produced it, so a reordered or shortened feed list hands an existing
//! address to a different podcast. [`AddressMode::ContentHash`] derives the
//! segment from the child's URL instead; switching modes changes every
//! address a media server has seen, which is why positional stays the
//! default.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::BusError;

/// Object path prefix shared by every MediaServer2 provider.
pub const OBJECT_PREFIX: &str = "/org/gnome/UPnP/MediaServer2";

/// Well-known bus name prefix shared by every MediaServer2 provider.
pub const SERVICE_PREFIX: &str = "org.gnome.UPnP.MediaServer2";

/// Segment under which an episode's artwork is exported.
pub const ART_SEGMENT: &str = "art";

/// Hex digits kept from the SHA-256 digest in content-hash mode.
const HASH_SEGMENT_LEN: usize = 16;

/// A validated bus object path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Validate `path` against the object path grammar: a leading `/`,
    /// non-empty segments of `[A-Za-z0-9_]`, no trailing `/` except for
    /// the bare root.
    pub fn parse(path: &str) -> Result<Self, BusError> {
        let malformed = || BusError::MalformedAddress(path.to_string());
        let rest = path.strip_prefix('/').ok_or_else(malformed)?;
        if rest.is_empty() {
            return Ok(Self(path.to_string()));
        }
        if !rest.split('/').all(is_valid_segment) {
            return Err(malformed());
        }
        Ok(Self(path.to_string()))
    }

    /// The server root for an application name, sanitised into a single
    /// segment.
    pub fn root(app_name: &str) -> Result<Self, BusError> {
        let segment = sanitize_segment(app_name);
        if segment.is_empty() {
            return Err(BusError::MalformedAddress(app_name.to_string()));
        }
        Self::parse(&format!("{OBJECT_PREFIX}/{segment}"))
    }

    /// Append one segment. The segment must already be valid; schemes in
    /// this module only produce digits, hex digits or [`ART_SEGMENT`].
    pub fn child(&self, segment: &str) -> Self {
        debug_assert!(is_valid_segment(segment), "invalid segment {segment:?}");
        if self.0 == "/" {
            Self(format!("/{segment}"))
        } else {
            Self(format!("{}/{segment}", self.0))
        }
    }

    /// The containing address, or `None` for `/`.
    pub fn parent(&self) -> Option<Self> {
        let idx = self.0.rfind('/')?;
        match idx {
            0 if self.0.len() == 1 => None,
            0 => Some(Self("/".to_string())),
            _ => Some(Self(self.0[..idx].to_string())),
        }
    }

    pub fn last_segment(&self) -> Option<&str> {
        self.0.rsplit('/').next().filter(|s| !s.is_empty())
    }

    /// True if `other` lies strictly below this address.
    pub fn is_ancestor_of(&self, other: &Address) -> bool {
        if self.0 == "/" {
            return other.0.len() > 1;
        }
        other
            .0
            .strip_prefix(&self.0)
            .is_some_and(|rest| rest.starts_with('/'))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bus name under which the tree for `app_name` is published.
pub fn service_name(app_name: &str) -> String {
    format!("{SERVICE_PREFIX}.{}", sanitize_segment(app_name))
}

/// Replace every character outside `[A-Za-z0-9_]` with `_`.
pub fn sanitize_segment(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// How child segments are derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddressMode {
    /// The zero-based position of the child in the current enumeration.
    #[default]
    Positional,
    /// A truncated SHA-256 of the child's content key.
    ContentHash,
}

/// Anything that can be placed in the tree: podcasts and episodes.
pub trait ContentKey {
    /// Identity used by [`AddressMode::ContentHash`]. Never consulted in
    /// positional mode.
    fn content_key(&self) -> &str;
}

/// Computes child addresses and resolves them back to children.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressScheme {
    mode: AddressMode,
}

impl AddressScheme {
    pub fn new(mode: AddressMode) -> Self {
        Self { mode }
    }

    /// The segment for `siblings[index]`.
    ///
    /// In content-hash mode, siblings sharing a content key are told apart
    /// by how many of them precede this one; the first keeps the plain hash.
    pub fn segment<T: ContentKey>(&self, siblings: &[T], index: usize) -> String {
        match self.mode {
            AddressMode::Positional => index.to_string(),
            AddressMode::ContentHash => {
                let key = siblings.get(index).map(T::content_key).unwrap_or_default();
                let earlier = siblings
                    .iter()
                    .take(index)
                    .filter(|s| s.content_key() == key)
                    .count();
                hash_segment(key, earlier)
            }
        }
    }

    pub fn child<T: ContentKey>(&self, parent: &Address, siblings: &[T], index: usize) -> Address {
        parent.child(&self.segment(siblings, index))
    }

    /// Find the child that `segment` names in the current enumeration.
    pub fn locate<'a, T: ContentKey>(
        &self,
        children: &'a [T],
        segment: &str,
    ) -> Option<(usize, &'a T)> {
        match self.mode {
            AddressMode::Positional => {
                let index: usize = segment.parse().ok()?;
                children.get(index).map(|child| (index, child))
            }
            AddressMode::ContentHash => {
                let mut seen: HashMap<&'a str, usize> = HashMap::new();
                children.iter().enumerate().find(|&(_, child)| {
                    let occurrence = seen.entry(child.content_key()).or_default();
                    let hit = hash_segment(child.content_key(), *occurrence) == segment;
                    *occurrence += 1;
                    hit
                })
            }
        }
    }
}

fn hash_segment(key: &str, occurrence: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    if occurrence > 0 {
        hasher.update(b"\0");
        hasher.update(occurrence.to_string().as_bytes());
    }
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(HASH_SEGMENT_LEN);
    hex
}

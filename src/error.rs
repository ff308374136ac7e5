//! Error types shared by the tree, the feed cache and the object bus.
//!
//! Collaborators at the edge (feed fetching, image probing) report failures
//! through [`anyhow::Error`]; everything the core hands back to a bus caller
//! is one of the typed variants below.

use thiserror::Error;

use crate::address::Address;

/// Failures raised by the feed cache, the item model and the container nodes.
#[derive(Debug, Error)]
pub enum TreeError {
    /// The feed source could not be queried at all. The previously cached
    /// snapshot, if any, is left untouched.
    #[error("feed source unavailable: {0:#}")]
    SourceUnavailable(anyhow::Error),

    /// The item has no enclosures, so it has nothing a renderer could play.
    #[error("no playable content at {0}")]
    NoPlayableContent(Address),

    /// The feed a directory node was created for is no longer in the
    /// current snapshot.
    #[error("object {0} no longer exists in the current feed snapshot")]
    ObjectGone(Address),
}

/// Failures raised while registering objects on, or dispatching calls
/// through, an object bus.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("an object is already exported at {address} for {interface}")]
    AlreadyExported { address: Address, interface: String },

    #[error("malformed object address {0:?}")]
    MalformedAddress(String),

    #[error("no object exported at {0}")]
    UnknownObject(Address),

    #[error("object {address} does not implement {interface}")]
    UnknownInterface { address: Address, interface: String },

    #[error("{interface} has no member {member}")]
    UnknownMember { interface: String, member: String },

    #[error("invalid arguments for {member}: {reason}")]
    InvalidArgs { member: String, reason: String },

    #[error(transparent)]
    Failed(#[from] TreeError),
}

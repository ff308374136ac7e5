//! Podcast feeds exposed as a hierarchical MediaServer2 object tree.
//!
//! See `main.rs` for how the pieces are wired together.

pub mod address;
pub mod bus;
pub mod cache;
pub mod config;
pub mod error;
pub mod export;
pub mod model;
pub mod node;
pub mod probe;
pub mod source;

#[cfg(test)]
mod testing;

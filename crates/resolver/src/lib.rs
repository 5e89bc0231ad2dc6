//! Package index client for ordo tool specs.
//!
//! Maps a tool `alias@version` to a reproducible package coordinate: the
//! nixpkgs commit pinning that version plus the attribute path to use in a
//! generated package expression. Resolutions are cached on disk keyed by
//! `SHA-256(alias@version)`; entries carry every supported system so a
//! cache produced on one machine serves another.

mod client;
mod error;

pub use client::{
    DEFAULT_INDEX_URL, FlakeInstallable, FlakeRef, IndexClient, IndexEntry, Resolution,
    SystemRecord, current_system,
};
pub use error::{Error, Result};

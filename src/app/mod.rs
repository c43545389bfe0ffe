//! Command runners for the `harvester` binary.

pub(crate) mod crawl;
pub(crate) mod download;
pub(crate) mod extract;
pub(crate) mod progress;

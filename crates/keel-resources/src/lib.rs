//! Framework metadata resources: version negotiation and the library cache.
//!
//! Two components live here:
//! - [`VersionNegotiator`] maps a loosely-specified version string onto a
//!   concrete release, using a memo table and the remotely published
//!   version map.
//! - [`ResourceStore`] assembles the per-release library metadata set,
//!   disk-cache-first with a network fallback, deduplicating concurrent
//!   identical builds through a shared-future map.
//!
//! Neither component ever surfaces an error to its caller: unreachable or
//! malformed resources degrade to smaller (or default) results.

mod disk;
mod flight;
mod store;
pub mod urls;
mod version;

pub use disk::{cache_dir, CACHE_DIR_NAME, VERSION_INFO_FILE};
pub use flight::SingleFlight;
pub use store::{LibraryRef, LibrarySet, ResourceStore, VersionInfo};
pub use version::{VersionMap, VersionMapEntry, VersionNegotiator};

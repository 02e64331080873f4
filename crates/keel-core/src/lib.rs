//! Shared primitives for the Keel resolution core.
//!
//! This crate holds the types every other `keel-*` crate agrees on:
//! - [`FrameworkKind`]: which UI framework distribution a document targets
//! - [`Fetcher`]: the HTTP boundary, abstracted so tests can substitute
//!   failing/counting/gated fetchers
//! - path canonicalization for cache keys

mod fetch;
mod framework;
mod paths;

pub mod test_support;

pub use fetch::{FetchError, FetchResponse, Fetcher, HttpFetcher};
pub use framework::{FrameworkKind, DEFAULT_UI5_VERSION};
pub use paths::canonical_root;

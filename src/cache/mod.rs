//! Asset/response cache.
//!
//! Serves the journal's static shell and API responses with resilience to
//! intermittent connectivity:
//! - named, versioned cache generations with an explicit registry of which
//!   one is current (activation purges the rest)
//! - cache-first strategy for shell assets, network-first for the
//!   reflections API
//! - every network failure degrades to a cached entry or a synthetic
//!   fallback, never to an error

pub mod fetch;
pub mod store;
pub mod worker;

pub use fetch::{FetchedResponse, Fetcher, HttpFetcher, Request, ResponseSource};
pub use store::{CacheStore, SqliteCacheStore};
pub use worker::CacheWorker;

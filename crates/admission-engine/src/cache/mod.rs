//! Shared namespace metadata cache.
//!
//! The only cross-request mutable state in the engine: every plugin that
//! needs namespace annotations reads through this cache instead of calling
//! the cluster API for each request.

mod namespace;

pub use namespace::{
    NamespaceCache, NamespaceFetcher, NamespaceLookup, StaticNamespaces, DEFAULT_CLEANUP_INTERVAL,
    DEFAULT_TTL,
};

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use admission_core::error::{AdmissionError, Result};
use admission_core::protocol::Namespace;

pub const DEFAULT_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Fetches namespace metadata from the cluster.
///
/// Implementations must return within a bounded time or fail.
#[async_trait]
pub trait NamespaceFetcher: Send + Sync {
    async fn fetch(&self, name: &str) -> Result<Namespace>;
}

/// Fetcher over a fixed set of namespaces (config-declared, or tests).
#[derive(Debug, Default)]
pub struct StaticNamespaces {
    items: HashMap<String, Namespace>,
}

impl StaticNamespaces {
    pub fn new(items: impl IntoIterator<Item = Namespace>) -> Self {
        Self {
            items: items
                .into_iter()
                .map(|ns| (ns.metadata.name.clone(), ns))
                .collect(),
        }
    }
}

#[async_trait]
impl NamespaceFetcher for StaticNamespaces {
    async fn fetch(&self, name: &str) -> Result<Namespace> {
        self.items
            .get(name)
            .cloned()
            .ok_or_else(|| AdmissionError::namespace_not_found(name))
    }
}

#[derive(Debug)]
struct CacheEntry {
    value: Arc<Namespace>,
    expires_at: Instant,
}

/// TTL-bounded memoization of namespace lookups.
///
/// Concurrent misses for one key wait on a per-key gate, so only the first
/// caller reaches the fetcher; the rest find the entry it stored.
#[derive(Debug)]
pub struct NamespaceCache {
    entries: DashMap<String, CacheEntry>,
    inflight: DashMap<String, Arc<Mutex<()>>>,
    ttl: Duration,
    cleanup_interval: Duration,
}

impl Default for NamespaceCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_CLEANUP_INTERVAL)
    }
}

impl NamespaceCache {
    pub fn new(ttl: Duration, cleanup_interval: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            inflight: DashMap::new(),
            ttl,
            cleanup_interval,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached namespace, or fetch and cache it.
    /// Fetch failures are returned as-is and never cached.
    pub async fn get_namespace(
        &self,
        fetcher: &dyn NamespaceFetcher,
        name: &str,
    ) -> Result<Arc<Namespace>> {
        if let Some(ns) = self.live(name) {
            return Ok(ns);
        }

        let gate = self
            .inflight
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        let _guard = gate.lock().await;

        // another caller may have filled it while we waited
        if let Some(ns) = self.live(name) {
            return Ok(ns);
        }

        let fetched = fetcher.fetch(name).await;
        let result = fetched.map(|ns| {
            let ns = Arc::new(ns);
            self.entries.insert(
                name.to_string(),
                CacheEntry {
                    value: Arc::clone(&ns),
                    expires_at: Instant::now() + self.ttl,
                },
            );
            tracing::debug!(namespace = %name, "namespace cached");
            ns
        });
        // gate goes only after the entry is visible
        self.inflight.remove(name);
        result
    }

    /// Store a snapshot directly, with a fresh expiry.
    pub fn insert(&self, ns: Namespace) {
        let name = ns.metadata.name.clone();
        self.entries.insert(
            name,
            CacheEntry {
                value: Arc::new(ns),
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub fn invalidate(&self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    /// Drop expired entries, returning how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sweep periodically on the current runtime. The task ends by itself
    /// once the cache is dropped; abort the handle to stop it earlier.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.cleanup_interval.max(Duration::from_millis(10));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else { break };
                let removed = cache.sweep();
                if removed > 0 {
                    tracing::debug!(removed, "namespace cache swept");
                }
            }
        })
    }

    fn live(&self, name: &str) -> Option<Arc<Namespace>> {
        let now = Instant::now();
        {
            let entry = self.entries.get(name)?;
            if entry.expires_at > now {
                return Some(Arc::clone(&entry.value));
            }
        }
        // expired: evict lazily
        self.entries.remove_if(name, |_, e| e.expires_at <= now);
        None
    }
}

/// Cache handle paired with the fetch capability. Cheap to clone; this is
/// what request contexts and script sandboxes carry around.
#[derive(Clone)]
pub struct NamespaceLookup {
    cache: Arc<NamespaceCache>,
    fetcher: Arc<dyn NamespaceFetcher>,
}

impl NamespaceLookup {
    pub fn new(cache: Arc<NamespaceCache>, fetcher: Arc<dyn NamespaceFetcher>) -> Self {
        Self { cache, fetcher }
    }

    pub async fn get(&self, name: &str) -> Result<Arc<Namespace>> {
        self.cache.get_namespace(self.fetcher.as_ref(), name).await
    }

    pub fn cache(&self) -> &Arc<NamespaceCache> {
        &self.cache
    }
}

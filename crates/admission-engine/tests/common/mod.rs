#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use admission_core::error::Result;
use admission_core::protocol::{GroupVersionKind, Namespace};
use admission_engine::cache::{NamespaceCache, NamespaceFetcher, NamespaceLookup, StaticNamespaces};
use admission_engine::context::RequestContext;

pub const PREFIX: &str = "policy-admission.acp.homeoffice.gov.uk";

/// Static fetcher that counts calls and can be slowed down.
pub struct CountingFetcher {
    inner: StaticNamespaces,
    pub calls: AtomicUsize,
    delay: Duration,
}

impl CountingFetcher {
    pub fn new(items: impl IntoIterator<Item = Namespace>) -> Self {
        Self::with_delay(items, Duration::ZERO)
    }

    pub fn with_delay(items: impl IntoIterator<Item = Namespace>, delay: Duration) -> Self {
        Self {
            inner: StaticNamespaces::new(items),
            calls: AtomicUsize::new(0),
            delay,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NamespaceFetcher for CountingFetcher {
    async fn fetch(&self, name: &str) -> Result<Namespace> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.fetch(name).await
    }
}

pub fn lookup(items: impl IntoIterator<Item = Namespace>) -> NamespaceLookup {
    NamespaceLookup::new(
        Arc::new(NamespaceCache::default()),
        Arc::new(StaticNamespaces::new(items)),
    )
}

pub fn context(object: Value, kind: &str, namespace: &str, lookup: NamespaceLookup) -> RequestContext {
    let gvk = match kind {
        "Ingress" => GroupVersionKind::new("networking.k8s.io", "v1", kind),
        _ => GroupVersionKind::new("", "v1", kind),
    };
    RequestContext::new(object, gvk, namespace, lookup, PREFIX)
}

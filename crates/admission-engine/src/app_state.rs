//! Shared application state for the admission webhook.
//!
//! Compiles the configured plugins into a dispatcher once at startup and
//! hands out per-request contexts wired to the shared namespace cache.

use std::sync::Arc;

use serde_json::Value;

use admission_core::error::{AdmissionError, Result};
use admission_core::protocol::object::object_namespace;
use admission_core::protocol::{AdmissionReview, GroupVersionKind, Namespace};

use crate::cache::{NamespaceCache, NamespaceFetcher, NamespaceLookup, StaticNamespaces};
use crate::config::AdmissionConfig;
use crate::context::RequestContext;
use crate::dispatch::Dispatcher;
use crate::plugins;
use crate::sandbox::ScriptSandbox;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    dispatcher: Dispatcher,
    lookup: NamespaceLookup,
    prefix: Arc<str>,
}

impl AppState {
    /// Build state with the config-declared namespaces as the metadata source.
    pub fn new(cfg: &AdmissionConfig) -> Result<Self> {
        let fetcher = Arc::new(StaticNamespaces::new(
            cfg.namespaces.iter().cloned().map(Namespace::from),
        ));
        Self::with_fetcher(cfg, fetcher)
    }

    /// Build state around an external metadata source (cluster client, test double).
    pub fn with_fetcher(cfg: &AdmissionConfig, fetcher: Arc<dyn NamespaceFetcher>) -> Result<Self> {
        let cache = Arc::new(NamespaceCache::new(
            cfg.engine.cache_ttl(),
            cfg.engine.cache_cleanup(),
        ));
        let sandbox = Arc::new(ScriptSandbox::default());

        let mut dispatcher = Dispatcher::new();
        for p in &cfg.plugins {
            let plugin = plugins::build(p, &sandbox).map_err(|e| {
                AdmissionError::InvalidConfig(format!(
                    "plugin build failed (plugin={}): {e}",
                    p.name()
                ))
            })?;
            dispatcher.register(plugin);
        }

        Ok(Self::from_parts(
            dispatcher,
            NamespaceLookup::new(cache, fetcher),
            &cfg.engine.annotation_prefix,
        ))
    }

    pub fn from_parts(dispatcher: Dispatcher, lookup: NamespaceLookup, prefix: &str) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                dispatcher,
                lookup,
                prefix: Arc::from(prefix),
            }),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn namespace_cache(&self) -> &Arc<NamespaceCache> {
        self.inner.lookup.cache()
    }

    pub fn request_context(
        &self,
        object: Value,
        gvk: GroupVersionKind,
        namespace: impl Into<String>,
    ) -> RequestContext {
        RequestContext::new(
            object,
            gvk,
            namespace,
            self.inner.lookup.clone(),
            Arc::clone(&self.inner.prefix),
        )
    }

    /// Evaluate one review and build the response review.
    pub async fn review(&self, review: AdmissionReview) -> Result<AdmissionReview> {
        let req = review
            .request
            .ok_or_else(|| AdmissionError::BadRequest("admission review has no request".into()))?;

        let namespace = if req.namespace.is_empty() {
            object_namespace(&req.object).to_string()
        } else {
            req.namespace
        };
        let cx = self.request_context(req.object, req.kind, namespace);
        let decision = self.inner.dispatcher.evaluate(&cx).await;

        tracing::info!(
            uid = %req.uid,
            kind = %cx.kind(),
            namespace = %cx.namespace(),
            allowed = decision.allowed,
            "admission reviewed"
        );
        Ok(AdmissionReview::respond(&review.api_version, &req.uid, &decision))
    }

    /// Stop every plugin. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.inner.dispatcher.stop_all().await;
    }
}

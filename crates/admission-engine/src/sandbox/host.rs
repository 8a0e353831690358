//! Host function surface exposed to policy scripts.
//!
//! Helpers are grouped into `HostExtension`s. The sandbox installs every
//! registered extension into each fresh interpreter; plugins needing extra
//! helpers register more extensions instead of patching the sandbox.

use std::sync::{Arc, Mutex};

use regex::Regex;
use rhai::{Array, Dynamic, Engine, EvalAltResult, ImmutableString, Map};
use tokio::runtime::Handle;

use admission_core::Violation;

use crate::cache::NamespaceLookup;

/// Per-invocation state host functions close over.
#[derive(Clone)]
pub struct HostContext {
    pub plugin: Arc<str>,
    pub denials: DenySink,
    pub lookup: NamespaceLookup,
    pub runtime: Handle,
}

/// A group of host functions (and optionally scope variables).
pub trait HostExtension: Send + Sync {
    fn install(&self, engine: &mut Engine, host: &HostContext);

    /// Mutable variables this extension binds into the script scope.
    fn bindings(&self, _host: &HostContext) -> Vec<(&'static str, Dynamic)> {
        Vec::new()
    }
}

/// Every helper shipped with the engine.
pub fn builtin_extensions() -> Vec<Arc<dyn HostExtension>> {
    vec![
        Arc::new(Logging),
        Arc::new(Denials),
        Arc::new(StringHelpers),
        Arc::new(ImageHelpers),
        Arc::new(CacheAccess),
    ]
}

/// Violations accumulated by `deny()` during one invocation.
#[derive(Debug, Clone, Default)]
pub struct DenySink {
    inner: Arc<Mutex<Vec<Violation>>>,
}

impl DenySink {
    pub fn push(&self, v: Violation) {
        // a poisoned lock only means a host fn panicked mid-push; keep the data
        let mut g = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        g.push(v);
    }

    pub fn take(&self) -> Vec<Violation> {
        let mut g = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        std::mem::take(&mut *g)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `log(message)`, plus `print`/`debug` routed to tracing.
pub struct Logging;

impl HostExtension for Logging {
    fn install(&self, engine: &mut Engine, host: &HostContext) {
        let plugin = Arc::clone(&host.plugin);
        engine.register_fn("log", move |message: Dynamic| {
            tracing::info!(plugin = %plugin, "{}", message);
        });

        let plugin = Arc::clone(&host.plugin);
        engine.on_print(move |text| {
            tracing::info!(plugin = %plugin, "{}", text);
        });

        let plugin = Arc::clone(&host.plugin);
        engine.on_debug(move |text, _source, pos| {
            tracing::debug!(plugin = %plugin, %pos, "{}", text);
        });
    }
}

/// `deny(path, message, value)` and `deny(path, message)`. Arguments of any
/// type are rendered as text.
pub struct Denials;

impl HostExtension for Denials {
    fn install(&self, engine: &mut Engine, host: &HostContext) {
        let sink = host.denials.clone();
        engine.register_fn("deny", move |path: Dynamic, message: Dynamic, value: Dynamic| {
            sink.push(Violation::invalid(path.to_string(), value.to_string(), message.to_string()));
        });

        let sink = host.denials.clone();
        engine.register_fn("deny", move |path: Dynamic, message: Dynamic| {
            sink.push(Violation::invalid(path.to_string(), "", message.to_string()));
        });
    }
}

/// `hasPrefix`, `hasSuffix`, `inDomain`.
pub struct StringHelpers;

impl HostExtension for StringHelpers {
    fn install(&self, engine: &mut Engine, _host: &HostContext) {
        engine.register_fn("hasPrefix", |s: ImmutableString, prefix: ImmutableString| {
            s.starts_with(prefix.as_str())
        });
        engine.register_fn("hasSuffix", |s: ImmutableString, suffix: ImmutableString| {
            s.ends_with(suffix.as_str())
        });
        engine.register_fn("inDomain", |host: ImmutableString, domain: ImmutableString| {
            in_domain(&host, &domain)
        });
        engine.register_fn("inDomain", |host: ImmutableString, domains: Array| {
            domains
                .iter()
                .filter_map(|d| d.clone().into_immutable_string().ok())
                .any(|d| in_domain(&host, &d))
        });
    }
}

/// True when `host` is `domain` itself or any name below it.
pub fn in_domain(host: &str, domain: &str) -> bool {
    let host = host.trim_end_matches('.');
    let domain = domain.trim_end_matches('.').trim_start_matches('.');
    if domain.is_empty() {
        return false;
    }
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|rest| rest.ends_with('.'))
}

/// `hasImage(pattern, containers)`: any container whose image matches the regex.
pub struct ImageHelpers;

impl HostExtension for ImageHelpers {
    fn install(&self, engine: &mut Engine, _host: &HostContext) {
        engine.register_fn(
            "hasImage",
            |pattern: ImmutableString, containers: Array| -> Result<bool, Box<EvalAltResult>> {
                has_image(&pattern, &containers)
            },
        );
    }
}

fn has_image(pattern: &str, containers: &Array) -> Result<bool, Box<EvalAltResult>> {
    let matcher = Regex::new(pattern)
        .map_err(|e| format!("hasImage: invalid pattern {pattern:?}: {e}"))?;

    Ok(containers
        .iter()
        .filter_map(|c| c.clone().try_cast::<Map>())
        .filter_map(|c| c.get("image").map(|im| im.to_string()))
        .any(|image| matcher.is_match(&image)))
}

/// Script-side handle on the shared namespace cache, bound as `cache`.
#[derive(Clone)]
pub struct CacheHandle {
    lookup: NamespaceLookup,
    runtime: Handle,
}

impl CacheHandle {
    /// Read-through lookup; the document has the API shape (`metadata.annotations`, ...).
    fn namespace(&self, name: &str) -> Result<Dynamic, Box<EvalAltResult>> {
        let ns = self
            .runtime
            .block_on(self.lookup.get(name))
            .map_err(|e| e.to_string())?;
        rhai::serde::to_dynamic(ns.document())
    }

    fn invalidate(&self, name: &str) -> bool {
        self.lookup.cache().invalidate(name)
    }
}

/// `cache.namespace(name)` and `cache.invalidate(name)`.
pub struct CacheAccess;

impl HostExtension for CacheAccess {
    fn install(&self, engine: &mut Engine, _host: &HostContext) {
        engine
            .register_type_with_name::<CacheHandle>("Cache")
            .register_fn(
                "namespace",
                |h: &mut CacheHandle, name: ImmutableString| -> Result<Dynamic, Box<EvalAltResult>> {
                    h.namespace(&name)
                },
            )
            .register_fn("invalidate", |h: &mut CacheHandle, name: ImmutableString| {
                h.invalidate(&name)
            });
    }

    fn bindings(&self, host: &HostContext) -> Vec<(&'static str, Dynamic)> {
        let handle = CacheHandle {
            lookup: host.lookup.clone(),
            runtime: host.runtime.clone(),
        };
        vec![("cache", Dynamic::from(handle))]
    }
}

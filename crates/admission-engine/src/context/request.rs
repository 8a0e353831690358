use std::sync::Arc;

use serde_json::Value;

use admission_core::error::Result;
use admission_core::Filter;
use admission_core::protocol::{GroupVersionKind, Namespace};

use crate::cache::NamespaceLookup;

/// One admission evaluation unit.
///
/// Built fresh for every request and never shared across requests. The
/// object is immutable once built; only the missing `apiVersion`/`kind`
/// fields are back-filled from the descriptor at construction.
#[derive(Clone)]
pub struct RequestContext {
    object: Value,
    gvk: GroupVersionKind,
    namespace: String,
    lookup: NamespaceLookup,
    prefix: Arc<str>,
}

impl RequestContext {
    pub fn new(
        mut object: Value,
        gvk: GroupVersionKind,
        namespace: impl Into<String>,
        lookup: NamespaceLookup,
        prefix: impl Into<Arc<str>>,
    ) -> Self {
        if let Value::Object(map) = &mut object {
            if !map.contains_key("apiVersion") {
                map.insert("apiVersion".into(), Value::String(gvk.api_version()));
            }
            if !map.contains_key("kind") {
                map.insert("kind".into(), Value::String(gvk.kind.clone()));
            }
        }

        Self {
            object,
            gvk,
            namespace: namespace.into(),
            lookup,
            prefix: prefix.into(),
        }
    }

    pub fn object(&self) -> &Value {
        &self.object
    }
    pub fn gvk(&self) -> &GroupVersionKind {
        &self.gvk
    }
    pub fn kind(&self) -> &str {
        &self.gvk.kind
    }
    /// Empty for cluster-scoped objects.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
    pub fn lookup(&self) -> &NamespaceLookup {
        &self.lookup
    }
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn is_subject_to(&self, filter: &Filter) -> bool {
        filter.matches(&self.namespace, self.kind())
    }

    /// `<prefix>/<plugin>/<key>`, the namespace annotation plugins read
    /// their per-namespace switches from.
    pub fn annotation_key(&self, plugin: &str, key: &str) -> String {
        format!("{}/{}/{}", self.prefix, plugin, key)
    }

    /// Metadata of the request's namespace, through the shared cache.
    /// `None` for cluster-scoped objects.
    pub async fn namespace_metadata(&self) -> Result<Option<Arc<Namespace>>> {
        if self.namespace.is_empty() {
            return Ok(None);
        }
        self.lookup.get(&self.namespace).await.map(Some)
    }
}

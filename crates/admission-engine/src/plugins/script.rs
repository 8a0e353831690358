use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use admission_core::error::Result;
use admission_core::filter::FilterKind;
use admission_core::protocol::Namespace;
use admission_core::{Filter, Violation};

use crate::config::ScriptConfig;
use crate::context::RequestContext;
use crate::dispatch::Plugin;
use crate::sandbox::{Bindings, SandboxError, ScriptSandbox};

/// Policy backed by a script evaluated in the sandbox.
///
/// Scripts see `object`, `namespace` (namespaced objects only), `cache`, one
/// constant per configured option, and the host helpers (`deny`, `log`, ...).
pub struct ScriptPlugin {
    name: Arc<str>,
    script: Arc<str>,
    timeout: Duration,
    options: BTreeMap<String, Value>,
    filter: Filter,
    sandbox: Arc<ScriptSandbox>,
}

impl ScriptPlugin {
    pub fn new(cfg: &ScriptConfig, sandbox: Arc<ScriptSandbox>) -> Self {
        Self {
            name: Arc::from(cfg.name.as_str()),
            script: Arc::from(cfg.script.as_str()),
            timeout: cfg.timeout(),
            options: cfg.options.clone(),
            filter: cfg.filter.to_filter(FilterKind::All),
            sandbox,
        }
    }

    fn bindings(
        &self,
        cx: &RequestContext,
        namespace: Option<&Namespace>,
    ) -> std::result::Result<Bindings, SandboxError> {
        let mut b = Bindings::new();
        for (key, value) in &self.options {
            b.bind_json(key, value)?;
        }
        b.bind_json("object", cx.object())?;
        if let Some(ns) = namespace {
            b.bind_json("namespace", &ns.document())?;
        }
        Ok(b)
    }
}

#[async_trait]
impl Plugin for ScriptPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn filter_on(&self) -> &Filter {
        &self.filter
    }

    async fn admit(&self, cx: &RequestContext) -> Result<Vec<Violation>> {
        // a failed lookup denies: it cannot be told apart from a policy-relevant condition
        let namespace = match cx.namespace_metadata().await {
            Ok(ns) => ns,
            Err(e) => {
                tracing::warn!(plugin = %self.name, namespace = %cx.namespace(), error = %e, "namespace lookup failed");
                return Ok(vec![Violation::internal("", e)]);
            }
        };

        let bindings = match self.bindings(cx, namespace.as_deref()) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(plugin = %self.name, error = %e, "unable to bind request data");
                return Ok(vec![Violation::internal("", e)]);
            }
        };

        let outcome = self
            .sandbox
            .run(&self.name, &self.script, self.timeout, bindings, cx.lookup().clone())
            .await;
        Ok(outcome.into_violations())
    }
}

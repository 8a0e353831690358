use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;

use admission_core::error::Result;
use admission_core::{Decision, Filter, Violation};

use crate::context::RequestContext;

/// A unit of policy logic. Native checks and script-backed checks both sit
/// behind this trait; the dispatcher never knows which one it holds.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Stable identifier used in logs and violation attribution.
    fn name(&self) -> &str;

    /// Which requests this plugin applies to.
    fn filter_on(&self) -> &Filter;

    /// Evaluate the request. Empty list allows, anything else denies.
    async fn admit(&self, cx: &RequestContext) -> Result<Vec<Violation>>;

    /// Release held resources. Must be idempotent.
    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

/// Ordered plugin registry and decision aggregator.
#[derive(Default)]
pub struct Dispatcher {
    plugins: Vec<Arc<dyn Plugin>>,
    stopped: AtomicBool,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registration order is evaluation order, and therefore violation order.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Run every applicable plugin, in order, and aggregate their verdicts.
    ///
    /// A plugin that errors or panics contributes one internal violation and
    /// does not stop the remaining plugins.
    pub async fn evaluate(&self, cx: &RequestContext) -> Decision {
        let mut violations = Vec::new();

        let applicable = self
            .plugins
            .iter()
            .filter(|p| cx.is_subject_to(p.filter_on()));

        for plugin in applicable {
            let name = plugin.name();
            let found = match AssertUnwindSafe(plugin.admit(cx)).catch_unwind().await {
                Ok(Ok(found)) => found,
                Ok(Err(e)) => {
                    tracing::warn!(plugin = %name, error = %e, "plugin failed to evaluate request");
                    vec![Violation::internal("", e)]
                }
                Err(payload) => {
                    let msg = panic_message(payload.as_ref());
                    tracing::error!(plugin = %name, panic = %msg, "plugin panicked");
                    vec![Violation::internal("", format!("plugin panicked: {msg}"))]
                }
            };
            violations.extend(found.into_iter().map(|v| v.with_plugin(name)));
        }

        let decision = Decision::from_violations(violations);
        if !decision.allowed {
            tracing::info!(
                kind = %cx.kind(),
                namespace = %cx.namespace(),
                violations = decision.violations.len(),
                "request denied"
            );
        }
        decision
    }

    /// Stop every plugin once. Later calls are no-ops.
    pub async fn stop_all(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        for plugin in &self.plugins {
            if let Err(e) = plugin.stop().await {
                tracing::warn!(plugin = %plugin.name(), error = %e, "plugin stop failed");
            }
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

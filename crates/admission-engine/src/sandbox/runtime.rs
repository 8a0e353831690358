use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rhai::module_resolvers::DummyModuleResolver;
use rhai::{Dynamic, Engine, EvalAltResult, Scope};
use serde_json::Value;
use tokio::runtime::Handle;

use admission_core::Violation;

use super::host::{builtin_extensions, DenySink, HostContext, HostExtension};
use super::SandboxError;
use crate::cache::NamespaceLookup;
use crate::dispatch::panic_message;

/// Deadline applied when a plugin declares none (or zero).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long the worker gets to reach an operation boundary once interrupted.
const INTERRUPT_GRACE: Duration = Duration::from_millis(500);

// unoptimized builds use far more native stack per interpreter frame
const MAX_CALL_LEVELS: usize = if cfg!(debug_assertions) { 8 } else { 64 };
const MAX_EXPR_DEPTH: usize = if cfg!(debug_assertions) { 32 } else { 64 };
const MAX_FN_EXPR_DEPTH: usize = if cfg!(debug_assertions) { 16 } else { 32 };

/// Data ceilings per value; growing past one ends the script with an error.
const MAX_STRING_SIZE: usize = 1024 * 1024;
const MAX_ARRAY_SIZE: usize = 16 * 1024;
const MAX_MAP_SIZE: usize = 16 * 1024;

/// Termination token the progress hook hands to the interpreter; tells a
/// deadline abort apart from every other failure.
#[derive(Debug, Clone, Copy)]
struct DeadlineExceeded;

/// Interrupt flag shared by the deadline timer and the interpreter.
/// Raising it more than once, or after the script finished, does nothing.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Read-only values bound into the script scope as constants.
#[derive(Debug, Default)]
pub struct Bindings {
    constants: Vec<(String, Dynamic)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert a JSON document and bind it under `name`.
    pub fn bind_json(&mut self, name: &str, value: &Value) -> Result<(), SandboxError> {
        let converted = rhai::serde::to_dynamic(value).map_err(|e| SandboxError::HostData {
            what: name.to_string(),
            reason: e.to_string(),
        })?;
        self.constants.push((name.to_string(), converted));
        Ok(())
    }
}

/// Result of one invocation: denials recorded before the end, and the
/// failure, if the script did not complete cleanly.
#[derive(Debug, Default)]
pub struct SandboxOutcome {
    pub violations: Vec<Violation>,
    pub error: Option<SandboxError>,
}

impl SandboxOutcome {
    /// Denials in call order, followed by one internal violation for the failure.
    pub fn into_violations(self) -> Vec<Violation> {
        let mut out = self.violations;
        if let Some(e) = self.error {
            out.push(Violation::internal("", e));
        }
        out
    }
}

/// Builds one isolated interpreter per invocation and runs it under a deadline.
pub struct ScriptSandbox {
    extensions: Vec<Arc<dyn HostExtension>>,
}

impl Default for ScriptSandbox {
    fn default() -> Self {
        Self::new(builtin_extensions())
    }
}

impl ScriptSandbox {
    pub fn new(extensions: Vec<Arc<dyn HostExtension>>) -> Self {
        Self { extensions }
    }

    /// Add a helper group; applies to invocations started afterwards.
    pub fn extend(&mut self, extension: Arc<dyn HostExtension>) {
        self.extensions.push(extension);
    }

    /// Run `script` with `bindings` in a fresh interpreter.
    ///
    /// Never panics and never outlives `timeout` by more than the interrupt
    /// grace period: a worker that does not stop in time is detached.
    pub async fn run(
        &self,
        plugin: &Arc<str>,
        script: &Arc<str>,
        timeout: Duration,
        bindings: Bindings,
        lookup: NamespaceLookup,
    ) -> SandboxOutcome {
        let timeout = if timeout.is_zero() { DEFAULT_TIMEOUT } else { timeout };
        let interrupt = Interrupt::new();
        let host = HostContext {
            plugin: Arc::clone(plugin),
            denials: DenySink::default(),
            lookup,
            runtime: Handle::current(),
        };

        let engine = self.build_engine(&host, &interrupt);
        let mut scope = Scope::new();
        for (name, value) in bindings.constants {
            scope.push_constant_dynamic(name, value);
        }
        for ext in &self.extensions {
            for (name, value) in ext.bindings(&host) {
                scope.push_dynamic(name, value);
            }
        }

        let program = Arc::clone(script);
        let worker = tokio::task::spawn_blocking(move || {
            engine
                .run_with_scope(&mut scope, program.as_ref())
                .map_err(|e| classify(&e))
        });

        let ticker = {
            let interrupt = interrupt.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                interrupt.raise();
            })
        };

        let joined = tokio::time::timeout(timeout + INTERRUPT_GRACE, worker).await;
        ticker.abort();

        let error = match joined {
            Ok(Ok(Ok(()))) => None,
            Ok(Ok(Err(e))) => Some(e),
            Ok(Err(join)) if join.is_panic() => {
                let payload = join.into_panic();
                Some(SandboxError::Panicked(panic_message(payload.as_ref())))
            }
            Ok(Err(join)) => Some(SandboxError::Panicked(join.to_string())),
            Err(_elapsed) => {
                // worker stuck outside an operation boundary: leave it behind
                interrupt.raise();
                tracing::error!(plugin = %plugin, "script worker ignored interrupt; detached");
                Some(SandboxError::Timeout)
            }
        };

        match &error {
            Some(SandboxError::Timeout) => tracing::warn!(
                plugin = %plugin,
                timeout_ms = timeout.as_millis() as u64,
                "script timed out"
            ),
            Some(e) => tracing::warn!(plugin = %plugin, error = %e, "script failed"),
            None => {}
        }

        SandboxOutcome {
            violations: host.denials.take(),
            error,
        }
    }

    fn build_engine(&self, host: &HostContext, interrupt: &Interrupt) -> Engine {
        let mut engine = Engine::new();
        engine.set_module_resolver(DummyModuleResolver::new());
        engine.disable_symbol("eval");
        engine.set_max_call_levels(MAX_CALL_LEVELS);
        engine.set_max_expr_depths(MAX_EXPR_DEPTH, MAX_FN_EXPR_DEPTH);
        engine.set_max_string_size(MAX_STRING_SIZE);
        engine.set_max_array_size(MAX_ARRAY_SIZE);
        engine.set_max_map_size(MAX_MAP_SIZE);

        let flag = interrupt.clone();
        engine.on_progress(move |_ops| flag.is_raised().then(|| Dynamic::from(DeadlineExceeded)));

        for ext in &self.extensions {
            ext.install(&mut engine, host);
        }
        engine
    }
}

fn classify(err: &EvalAltResult) -> SandboxError {
    if aborted_by_deadline(err) {
        SandboxError::Timeout
    } else {
        SandboxError::Script(err.to_string())
    }
}

fn aborted_by_deadline(err: &EvalAltResult) -> bool {
    match err {
        EvalAltResult::ErrorTerminated(token, _) => token.is::<DeadlineExceeded>(),
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => aborted_by_deadline(inner),
        _ => false,
    }
}

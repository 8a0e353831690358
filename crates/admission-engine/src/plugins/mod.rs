//! Built-in policy plugins.
//!
//! - `script`: operator-authored scripts run in the sandbox.
//! - `kubecertmanager`: certificate/DNS checks for ingresses.

pub mod kubecertmanager;
pub mod script;

use std::sync::Arc;

use admission_core::error::Result;

use crate::config::PluginConfig;
use crate::dispatch::Plugin;
use crate::sandbox::ScriptSandbox;

pub use kubecertmanager::{CnameResolver, KubeCertManager, SystemResolver};
pub use script::ScriptPlugin;

/// Build one plugin from its config section.
pub fn build(cfg: &PluginConfig, sandbox: &Arc<ScriptSandbox>) -> Result<Arc<dyn Plugin>> {
    cfg.validate()?;

    let plugin: Arc<dyn Plugin> = match cfg {
        PluginConfig::Script(c) => Arc::new(ScriptPlugin::new(c, Arc::clone(sandbox))),
        PluginConfig::KubeCertManager(c) => {
            let resolver = Arc::new(SystemResolver::new(&c.external_ingress_hostname));
            Arc::new(KubeCertManager::new(c, resolver))
        }
    };
    tracing::info!(plugin = %plugin.name(), filter = %plugin.filter_on().kind, "plugin registered");
    Ok(plugin)
}

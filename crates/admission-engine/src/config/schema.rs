use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use admission_core::error::{AdmissionError, Result};
use admission_core::filter::{Filter, FilterKind, DEFAULT_IGNORED_NAMESPACES};
use admission_core::protocol::{Namespace, ObjectMeta};

/// Names the script sandbox binds itself; options may not shadow them.
const RESERVED_BINDINGS: [&str; 3] = ["object", "namespace", "cache"];

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdmissionConfig {
    pub version: u32,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub engine: EngineSection,

    /// Namespace metadata served to plugins when no cluster client is wired in.
    #[serde(default)]
    pub namespaces: Vec<NamespaceConfig>,

    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
}

impl AdmissionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(AdmissionError::UnsupportedVersion);
        }
        if self.plugins.is_empty() {
            return Err(AdmissionError::InvalidConfig("plugins must not be empty".into()));
        }

        self.server.validate()?;
        self.engine.validate()?;

        let mut seen = HashSet::new();
        for p in &self.plugins {
            p.validate()?;
            if !seen.insert(p.name()) {
                return Err(AdmissionError::InvalidConfig(format!(
                    "duplicate plugin name: {}",
                    p.name()
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        self.listen_addr().map(|_| ())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen.parse().map_err(|_| {
            AdmissionError::InvalidConfig(format!(
                "server.listen must be a valid socket address: {}",
                self.listen
            ))
        })
    }
}

fn default_listen() -> String {
    "0.0.0.0:8443".into()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    #[serde(default = "default_annotation_prefix")]
    pub annotation_prefix: String,

    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    #[serde(default = "default_cache_cleanup_ms")]
    pub cache_cleanup_ms: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            annotation_prefix: default_annotation_prefix(),
            cache_ttl_ms: default_cache_ttl_ms(),
            cache_cleanup_ms: default_cache_cleanup_ms(),
        }
    }
}

impl EngineSection {
    pub fn validate(&self) -> Result<()> {
        if self.annotation_prefix.is_empty() || self.annotation_prefix.ends_with('/') {
            return Err(AdmissionError::InvalidConfig(
                "engine.annotation_prefix must be non-empty without a trailing '/'".into(),
            ));
        }
        if !(1000..=3_600_000).contains(&self.cache_ttl_ms) {
            return Err(AdmissionError::InvalidConfig(
                "engine.cache_ttl_ms must be between 1000 and 3600000".into(),
            ));
        }
        if !(1000..=3_600_000).contains(&self.cache_cleanup_ms) {
            return Err(AdmissionError::InvalidConfig(
                "engine.cache_cleanup_ms must be between 1000 and 3600000".into(),
            ));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn cache_cleanup(&self) -> Duration {
        Duration::from_millis(self.cache_cleanup_ms)
    }
}

fn default_annotation_prefix() -> String {
    "policy-admission.acp.homeoffice.gov.uk".into()
}
fn default_cache_ttl_ms() -> u64 {
    60_000
}
fn default_cache_cleanup_ms() -> u64 {
    60_000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamespaceConfig {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl From<NamespaceConfig> for Namespace {
    fn from(c: NamespaceConfig) -> Self {
        Namespace {
            metadata: ObjectMeta {
                name: c.name,
                namespace: String::new(),
                labels: c.labels,
                annotations: c.annotations,
            },
        }
    }
}

/// Filter section shared by every plugin type.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    /// `"*"` or empty for every kind; absent means the plugin's own default.
    #[serde(default)]
    pub kind: Option<FilterKind>,
    /// Absent means the default system namespaces.
    #[serde(default)]
    pub ignore_namespaces: Option<Vec<String>>,
}

impl FilterConfig {
    pub fn to_filter(&self, default_kind: FilterKind) -> Filter {
        let kind = self.kind.clone().unwrap_or(default_kind);
        match &self.ignore_namespaces {
            Some(list) => Filter::new(kind, list.iter().cloned()),
            None => Filter::new(kind, DEFAULT_IGNORED_NAMESPACES),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PluginConfig {
    Script(ScriptConfig),
    KubeCertManager(KubeCertManagerConfig),
}

impl PluginConfig {
    pub fn name(&self) -> &str {
        match self {
            PluginConfig::Script(c) => &c.name,
            PluginConfig::KubeCertManager(c) => &c.name,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name().trim().is_empty() {
            return Err(AdmissionError::InvalidConfig("plugin name must not be empty".into()));
        }
        match self {
            PluginConfig::Script(c) => c.validate(),
            PluginConfig::KubeCertManager(c) => c.validate(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptConfig {
    pub name: String,
    pub script: String,
    /// Zero means the sandbox default.
    #[serde(default)]
    pub timeout_ms: u64,
    /// Bound verbatim into the script scope, one constant per key.
    #[serde(default)]
    pub options: BTreeMap<String, Value>,
    #[serde(default)]
    pub filter: FilterConfig,
}

impl ScriptConfig {
    pub fn validate(&self) -> Result<()> {
        if self.script.trim().is_empty() {
            return Err(AdmissionError::InvalidConfig(format!(
                "plugin {}: script must not be empty",
                self.name
            )));
        }
        if self.timeout_ms > 60_000 {
            return Err(AdmissionError::InvalidConfig(format!(
                "plugin {}: timeout_ms must be at most 60000",
                self.name
            )));
        }
        for key in self.options.keys() {
            if !is_identifier(key) || RESERVED_BINDINGS.contains(&key.as_str()) {
                return Err(AdmissionError::InvalidConfig(format!(
                    "plugin {}: option {key:?} is not a usable script variable name",
                    self.name
                )));
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KubeCertManagerConfig {
    #[serde(default = "default_kcm_name")]
    pub name: String,
    /// DNS name every externally served host must be a CNAME of.
    pub external_ingress_hostname: String,
    /// Domains whose certificates are issued internally.
    #[serde(default)]
    pub hosted_domains: Vec<String>,
    #[serde(default)]
    pub filter: FilterConfig,
}

impl KubeCertManagerConfig {
    pub fn new(external_ingress_hostname: impl Into<String>) -> Self {
        Self {
            name: default_kcm_name(),
            external_ingress_hostname: external_ingress_hostname.into(),
            hosted_domains: Vec::new(),
            filter: FilterConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.external_ingress_hostname.trim().is_empty() {
            return Err(AdmissionError::InvalidConfig(format!(
                "plugin {}: external_ingress_hostname must not be empty",
                self.name
            )));
        }
        Ok(())
    }
}

fn default_kcm_name() -> String {
    "kubecertmanager".into()
}

//! Admission config loader (strict parsing).

pub mod schema;

use std::fs;

use admission_core::error::{AdmissionError, Result};

pub use schema::{
    AdmissionConfig, EngineSection, FilterConfig, KubeCertManagerConfig, NamespaceConfig,
    PluginConfig, ScriptConfig, ServerSection,
};

pub fn load_from_file(path: &str) -> Result<AdmissionConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| AdmissionError::InvalidConfig(format!("read config {path} failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<AdmissionConfig> {
    let cfg: AdmissionConfig = serde_yaml::from_str(s)
        .map_err(|e| AdmissionError::InvalidConfig(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

//! kube-cert-manager ingress checks.
//!
//! Ingresses asking kube-cert-manager for a certificate (label
//! `stable.k8s.psg.io/kcm.class`) must either use hosted domains, or use the
//! http challenge through the external ingress with every host pointed at the
//! external ingress DNS name. The DNS check can be switched off per namespace
//! with the `<prefix>/kubecertmanager/enable-dns-check: "false"` annotation.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use admission_core::error::{AdmissionError, Result};
use admission_core::filter::FilterKind;
use admission_core::protocol::ObjectMeta;
use admission_core::{Filter, Violation};

use crate::config::KubeCertManagerConfig;
use crate::context::RequestContext;
use crate::dispatch::Plugin;

pub const KCM_CLASS_LABEL: &str = "stable.k8s.psg.io/kcm.class";
pub const KCM_PROVIDER_ANNOTATION: &str = "stable.k8s.psg.io/kcm.provider";
pub const INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";
pub const EXTERNAL_INGRESS_CLASS: &str = "nginx-external";
pub const HTTP_PROVIDER: &str = "http";

/// Namespace annotation switch, under `<prefix>/kubecertmanager/`.
pub const DNS_CHECK_ANNOTATION: &str = "enable-dns-check";

const DNS_TIMEOUT: Duration = Duration::from_secs(3);

/// Tells which DNS name a host points at.
#[async_trait]
pub trait CnameResolver: Send + Sync {
    async fn cname(&self, hostname: &str) -> Result<String>;
}

/// Resolver backed by the system resolver.
///
/// Reports the external ingress hostname when `hostname` resolves to at least
/// one of its addresses, and `hostname` itself otherwise.
pub struct SystemResolver {
    external: String,
}

impl SystemResolver {
    pub fn new(external: &str) -> Self {
        Self {
            external: external.to_string(),
        }
    }
}

async fn addresses(name: &str) -> Result<HashSet<IpAddr>> {
    let lookup = tokio::time::timeout(DNS_TIMEOUT, tokio::net::lookup_host((name, 443)))
        .await
        .map_err(|_| AdmissionError::Unavailable(format!("dns lookup for {name} timed out")))?
        .map_err(|e| AdmissionError::Unavailable(format!("dns lookup for {name} failed: {e}")))?;
    Ok(lookup.map(|sa| sa.ip()).collect())
}

#[async_trait]
impl CnameResolver for SystemResolver {
    async fn cname(&self, hostname: &str) -> Result<String> {
        let host = addresses(hostname).await?;
        let external = addresses(&self.external).await?;
        if host.is_disjoint(&external) {
            Ok(hostname.to_string())
        } else {
            Ok(self.external.clone())
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Ingress {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    spec: IngressSpec,
}

#[derive(Debug, Default, Deserialize)]
struct IngressSpec {
    #[serde(default)]
    rules: Vec<IngressRule>,
}

#[derive(Debug, Default, Deserialize)]
struct IngressRule {
    #[serde(default)]
    host: String,
}

pub struct KubeCertManager {
    name: String,
    external_hostname: String,
    hosted_domains: Vec<String>,
    filter: Filter,
    resolver: Arc<dyn CnameResolver>,
}

impl KubeCertManager {
    pub fn new(cfg: &KubeCertManagerConfig, resolver: Arc<dyn CnameResolver>) -> Self {
        Self {
            name: cfg.name.clone(),
            external_hostname: cfg.external_ingress_hostname.clone(),
            hosted_domains: cfg.hosted_domains.clone(),
            filter: cfg.filter.to_filter(FilterKind::from("Ingress")),
            resolver,
        }
    }

    fn is_hosted(&self, host: &str) -> bool {
        self.hosted_domains
            .iter()
            .any(|d| crate::sandbox::in_domain(host, d))
    }

    /// DNS check is on unless the namespace says exactly `false`.
    async fn dns_check_enabled(&self, cx: &RequestContext) -> Result<bool> {
        let Some(ns) = cx.namespace_metadata().await? else {
            return Ok(true);
        };
        let key = cx.annotation_key("kubecertmanager", DNS_CHECK_ANNOTATION);
        Ok(ns
            .annotation(&key)
            .map(|v| v.parse::<bool>().unwrap_or(true))
            .unwrap_or(true))
    }

    async fn check_dns(&self, index: usize, host: &str) -> Result<Option<Violation>> {
        let target = self.resolver.cname(host).await?;
        if target.trim_end_matches('.') == self.external_hostname.trim_end_matches('.') {
            return Ok(None);
        }
        Ok(Some(Violation::invalid(
            format!("spec.rules[{index}].host"),
            host,
            format!(
                "the hostname: {host} is not pointed to the external ingress dns name {}",
                self.external_hostname
            ),
        )))
    }
}

#[async_trait]
impl Plugin for KubeCertManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn filter_on(&self) -> &Filter {
        &self.filter
    }

    async fn admit(&self, cx: &RequestContext) -> Result<Vec<Violation>> {
        let ingress: Ingress = serde_json::from_value(cx.object().clone())
            .map_err(|e| AdmissionError::BadRequest(format!("unable to decode ingress: {e}")))?;

        if !ingress.metadata.labels.contains_key(KCM_CLASS_LABEL) {
            return Ok(vec![]);
        }

        let external: Vec<(usize, &str)> = ingress
            .spec
            .rules
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.host.is_empty() && !self.is_hosted(&r.host))
            .map(|(i, r)| (i, r.host.as_str()))
            .collect();
        if external.is_empty() {
            return Ok(vec![]);
        }

        let annotations = &ingress.metadata.annotations;
        let provider = annotations.get(KCM_PROVIDER_ANNOTATION).map(String::as_str);

        match provider {
            None => Ok(external
                .iter()
                .map(|(i, host)| {
                    Violation::invalid(
                        format!("spec.rules[{i}].host"),
                        *host,
                        "domain is not hosted internally and thus denied",
                    )
                })
                .collect()),
            Some(p) if p != HTTP_PROVIDER => Ok(vec![Violation::invalid(
                format!("annotations[{KCM_PROVIDER_ANNOTATION}]"),
                p,
                format!("invalid kube-cert-manager provider type: {p}, expected: {HTTP_PROVIDER}"),
            )]),
            Some(_) => {
                let class = annotations
                    .get(INGRESS_CLASS_ANNOTATION)
                    .map(String::as_str)
                    .unwrap_or_default();
                if class != EXTERNAL_INGRESS_CLASS {
                    return Ok(vec![Violation::invalid(
                        format!("annotations[{INGRESS_CLASS_ANNOTATION}]"),
                        class,
                        format!(
                            "invalid kube-cert-manager provider, expected '{EXTERNAL_INGRESS_CLASS}' for a http challenge"
                        ),
                    )]);
                }

                if !self.dns_check_enabled(cx).await? {
                    tracing::debug!(plugin = %self.name, namespace = %cx.namespace(), "dns check disabled by namespace");
                    return Ok(vec![]);
                }

                let mut violations = Vec::new();
                for (i, host) in external {
                    if let Some(v) = self.check_dns(i, host).await? {
                        violations.push(v);
                    }
                }
                Ok(violations)
            }
        }
    }
}

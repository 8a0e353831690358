#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use admission_core::error::Result;
use admission_core::protocol::Namespace;
use admission_core::{ErrorType, Violation};
use admission_engine::config::KubeCertManagerConfig;
use admission_engine::dispatch::Plugin;
use admission_engine::plugins::{CnameResolver, KubeCertManager};

const EXTERNAL: &str = "ingress.acp.example.com";
const DNS_CHECK: &str = "policy-admission.acp.homeoffice.gov.uk/kubecertmanager/enable-dns-check";
const NOT_POINTED: &str =
    "the hostname: site.nohere.com is not pointed to the external ingress dns name ingress.acp.example.com";

struct FixedResolver(String);

#[async_trait]
impl CnameResolver for FixedResolver {
    async fn cname(&self, _hostname: &str) -> Result<String> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
struct Check {
    annotations: &'static [(&'static str, &'static str)],
    namespace: &'static [(&'static str, &'static str)],
    labels: &'static [(&'static str, &'static str)],
    hosts: &'static [&'static str],
    resolves: &'static str,
    errors: Vec<Violation>,
}

const KCM: &[(&str, &str)] = &[("stable.k8s.psg.io/kcm.class", "default")];
const EXTERNAL_CLASS: &[(&str, &str)] = &[("kubernetes.io/ingress.class", "nginx-external")];
const HTTP_EXTERNAL: &[(&str, &str)] = &[
    ("kubernetes.io/ingress.class", "nginx-external"),
    ("stable.k8s.psg.io/kcm.provider", "http"),
];

fn to_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn ingress(check: &Check) -> Value {
    let rules: Vec<Value> = check.hosts.iter().map(|h| json!({ "host": h })).collect();
    json!({
        "metadata": {
            "name": "test-",
            "namespace": "test",
            "annotations": to_map(check.annotations),
            "labels": to_map(check.labels),
        },
        "spec": { "rules": rules },
    })
}

async fn admit(check: &Check) -> Vec<Violation> {
    let mut cfg = KubeCertManagerConfig::new(EXTERNAL);
    cfg.hosted_domains = vec!["example.com".into()];

    let plugin = KubeCertManager::new(&cfg, Arc::new(FixedResolver(check.resolves.to_string())));

    let mut ns = Namespace::new("test");
    for (k, v) in check.namespace {
        ns = ns.with_annotation(*k, *v);
    }
    let cx = common::context(ingress(check), "Ingress", "test", common::lookup([ns]));
    plugin.admit(&cx).await.unwrap()
}

fn invalid(field: &str, value: &str, detail: &str) -> Vec<Violation> {
    vec![Violation::invalid(field, value, detail)]
}

#[tokio::test]
async fn ingress_without_kcm_label_is_allowed() {
    assert!(admit(&Check::default()).await.is_empty());
}

#[tokio::test]
async fn hosted_domain_is_permitted() {
    let check = Check {
        annotations: EXTERNAL_CLASS,
        labels: KCM,
        hosts: &["site.example.com"],
        ..Default::default()
    };
    assert!(admit(&check).await.is_empty());
}

#[tokio::test]
async fn hosted_domain_with_dns_provider_is_permitted() {
    let check = Check {
        annotations: &[
            ("kubernetes.io/ingress.class", "nginx-external"),
            ("stable.k8s.psg.io/kcm.provider", "dns"),
        ],
        labels: KCM,
        hosts: &["site.example.com"],
        ..Default::default()
    };
    assert!(admit(&check).await.is_empty());
}

#[tokio::test]
async fn externally_hosted_domain_is_denied() {
    let check = Check {
        annotations: EXTERNAL_CLASS,
        labels: KCM,
        hosts: &["site.nohere.com"],
        errors: invalid(
            "spec.rules[0].host",
            "site.nohere.com",
            "domain is not hosted internally and thus denied",
        ),
        ..Default::default()
    };
    assert_eq!(admit(&check).await, check.errors);
}

#[tokio::test]
async fn invalid_challenge_type_is_denied() {
    let check = Check {
        annotations: &[
            ("kubernetes.io/ingress.class", "nginx-external"),
            ("stable.k8s.psg.io/kcm.provider", "bad"),
        ],
        labels: KCM,
        hosts: &["site.nohere.com"],
        errors: invalid(
            "annotations[stable.k8s.psg.io/kcm.provider]",
            "bad",
            "invalid kube-cert-manager provider type: bad, expected: http",
        ),
        ..Default::default()
    };
    assert_eq!(admit(&check).await, check.errors);
}

#[tokio::test]
async fn internal_ingress_class_is_denied() {
    let check = Check {
        annotations: &[
            ("kubernetes.io/ingress.class", "nginx-internal"),
            ("stable.k8s.psg.io/kcm.provider", "http"),
        ],
        labels: KCM,
        hosts: &["site.nohere.com"],
        errors: invalid(
            "annotations[kubernetes.io/ingress.class]",
            "nginx-internal",
            "invalid kube-cert-manager provider, expected 'nginx-external' for a http challenge",
        ),
        ..Default::default()
    };
    assert_eq!(admit(&check).await, check.errors);
}

#[tokio::test]
async fn unresolved_dns_is_denied() {
    let check = Check {
        annotations: HTTP_EXTERNAL,
        labels: KCM,
        hosts: &["site.nohere.com"],
        resolves: "bad.hostname",
        errors: invalid("spec.rules[0].host", "site.nohere.com", NOT_POINTED),
        ..Default::default()
    };
    let found = admit(&check).await;
    assert_eq!(found, check.errors);
    assert_eq!(found[0].error_type, ErrorType::Invalid);
}

#[tokio::test]
async fn resolving_to_external_ingress_is_permitted() {
    let check = Check {
        annotations: HTTP_EXTERNAL,
        labels: KCM,
        hosts: &["site.nohere.com"],
        resolves: "ingress.acp.example.com.",
        ..Default::default()
    };
    assert!(admit(&check).await.is_empty());
}

#[tokio::test]
async fn namespace_can_disable_dns_check() {
    let check = Check {
        annotations: HTTP_EXTERNAL,
        namespace: &[(DNS_CHECK, "false")],
        labels: KCM,
        hosts: &["site.nohere.com"],
        resolves: "bad.hostname",
        ..Default::default()
    };
    assert!(admit(&check).await.is_empty());
}

#[tokio::test]
async fn dns_check_enabled_explicitly_or_by_default() {
    const ENABLED: &[(&str, &str)] = &[(DNS_CHECK, "true")];
    const UNRECOGNISED: &[(&str, &str)] = &[(DNS_CHECK, "bad_value")];

    for namespace in [ENABLED, UNRECOGNISED] {
        let check = Check {
            annotations: HTTP_EXTERNAL,
            namespace,
            labels: KCM,
            hosts: &["site.nohere.com"],
            resolves: "bad.hostname",
            ..Default::default()
        };
        assert_eq!(
            admit(&check).await,
            invalid("spec.rules[0].host", "site.nohere.com", NOT_POINTED),
            "annotations {namespace:?}"
        );
    }
}

#[tokio::test]
async fn only_external_rules_are_reported() {
    let check = Check {
        annotations: EXTERNAL_CLASS,
        labels: KCM,
        hosts: &["site.example.com", "a.nohere.com", "b.nohere.com"],
        ..Default::default()
    };
    let fields: Vec<_> = admit(&check).await.into_iter().map(|v| v.field).collect();
    assert_eq!(fields, ["spec.rules[1].host", "spec.rules[2].host"]);
}

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use axum::{body::Bytes, extract::State, http::StatusCode, response::Response};
use serde_json::{json, Value};

use admission_engine::app_state::AppState;
use admission_engine::config;
use admission_engine::transport::webhook::validate;

const CONFIG: &str = r#"
version: 1
namespaces:
  - name: "team-a"
    annotations:
      example.com/allow-latest: "false"
plugins:
  - type: script
    name: "deny-latest"
    filter: { kind: "Pod" }
    script: |
      if namespace.metadata.annotations["example.com/allow-latest"] != "true" {
        let i = 0;
        for c in object.spec.containers {
          if hasImage(":latest$", [c]) {
            deny("spec.containers[" + i + "].image", "latest tag is not permitted", c.image);
          }
          i += 1;
        }
      }
"#;

fn state() -> AppState {
    AppState::new(&config::load_from_str(CONFIG).unwrap()).unwrap()
}

fn review(namespace: &str, image: &str) -> Value {
    json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
            "kind": {"group": "", "version": "v1", "kind": "Pod"},
            "namespace": namespace,
            "operation": "CREATE",
            "object": {
                "metadata": {"name": "web", "namespace": namespace},
                "spec": {"containers": [{"name": "web", "image": image}]}
            }
        }
    })
}

async fn body_json(resp: Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn allowed_review() {
    let resp = validate(
        State(state()),
        Bytes::from(review("team-a", "quay.io/app:v1.2").to_string()),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let out = body_json(resp).await;
    assert_eq!(out["kind"], "AdmissionReview");
    assert_eq!(out["apiVersion"], "admission.k8s.io/v1");
    assert_eq!(out["response"]["uid"], "705ab4f5-6393-11e8-b7cc-42010a800002");
    assert_eq!(out["response"]["allowed"], true);
    assert!(out["response"].get("status").is_none());
    assert!(out.get("request").is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn denied_review_carries_causes() {
    let resp = validate(
        State(state()),
        Bytes::from(review("team-a", "docker.io/nginx:latest").to_string()),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let out = body_json(resp).await;
    let status = &out["response"]["status"];
    assert_eq!(out["response"]["allowed"], false);
    assert_eq!(status["code"], 403);
    assert_eq!(status["reason"], "Invalid");
    assert_eq!(
        status["message"],
        "[deny-latest] spec.containers[0].image: Invalid value: \"docker.io/nginx:latest\": latest tag is not permitted"
    );
    assert_eq!(
        status["details"]["causes"][0],
        json!({
            "field": "spec.containers[0].image",
            "reason": "FieldValueInvalid",
            "message": "latest tag is not permitted"
        })
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_namespace_denies_with_internal_error() {
    let out = state()
        .review(serde_json::from_value(review("ghost", "quay.io/app:v1")).unwrap())
        .await
        .unwrap();
    let resp = out.response.unwrap();
    assert!(!resp.allowed);
    let causes = resp.status.unwrap().details.causes;
    assert_eq!(causes.len(), 1);
    assert_eq!(causes[0].reason, "InternalError");
}

#[tokio::test(flavor = "multi_thread")]
async fn ignored_namespace_and_other_kinds_pass() {
    let out = state()
        .review(serde_json::from_value(review("kube-system", "docker.io/nginx:latest")).unwrap())
        .await
        .unwrap();
    assert!(out.response.unwrap().allowed);

    let mut svc = review("team-a", "docker.io/nginx:latest");
    svc["request"]["kind"]["kind"] = json!("Service");
    let out = state().review(serde_json::from_value(svc).unwrap()).await.unwrap();
    assert!(out.response.unwrap().allowed);
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let resp = validate(State(state()), Bytes::from_static(b"{not json")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = validate(State(state()), Bytes::from_static(br#"{"kind":"AdmissionReview"}"#)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn shutdown_twice_is_harmless() {
    let s = state();
    assert_eq!(s.dispatcher().plugin_names(), ["deny-latest"]);
    s.shutdown().await;
    s.shutdown().await;
}

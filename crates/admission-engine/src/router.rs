//! Axum router wiring.
//!
//! `POST /validate` takes AdmissionReview documents; `GET /healthz` is liveness.

use axum::{
    routing::{get, post},
    Router,
};

use crate::{app_state::AppState, ops, transport};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/validate", post(transport::webhook::validate))
        .route("/healthz", get(ops::healthz))
        .with_state(state)
}

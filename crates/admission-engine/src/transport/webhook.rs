//! Validating webhook handler.
//!
//! Decode once, evaluate, encode once. Malformed bodies are answered with a
//! 400 and never reach the dispatcher.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use admission_core::error::{AdmissionError, ErrorCode};
use admission_core::protocol::review::decode_review;

use crate::app_state::AppState;

pub async fn validate(State(state): State<AppState>, body: Bytes) -> Response {
    let review = match decode_review(&body) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "rejecting malformed admission review");
            return error_response(&e);
        }
    };

    match state.review(review).await {
        Ok(out) => Json(out).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "admission review failed");
            error_response(&e)
        }
    }
}

fn error_response(e: &AdmissionError) -> Response {
    let status = match e.code() {
        ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string()).into_response()
}

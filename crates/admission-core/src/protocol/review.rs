//! AdmissionReview envelope.
//!
//! Only the fields the engine consumes or produces are modelled; unknown
//! request fields are tolerated since the API server adds new ones over time.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AdmissionError, Result};
use crate::protocol::object::GroupVersionKind;
use crate::violation::Decision;

pub const REVIEW_KIND: &str = "AdmissionReview";
pub const REVIEW_API_VERSION: &str = "admission.k8s.io/v1";

/// HTTP-style code carried in a deny status.
pub const DENIED_CODE: u16 = 403;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReview {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<AdmissionRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<AdmissionResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    pub uid: String,
    pub kind: GroupVersionKind,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub operation: String,
    #[serde(default)]
    pub object: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    pub uid: String,
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub code: u16,
    pub reason: String,
    pub message: String,
    pub details: StatusDetails,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusDetails {
    pub causes: Vec<StatusCause>,
}

/// One per-field cause, built from a violation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusCause {
    pub field: String,
    pub reason: String,
    pub message: String,
}

/// Decode a review body. The body must be an `AdmissionReview` carrying a request.
pub fn decode_review(body: &[u8]) -> Result<AdmissionReview> {
    let review: AdmissionReview = serde_json::from_slice(body)
        .map_err(|e| AdmissionError::BadRequest(format!("invalid admission review: {e}")))?;

    if review.kind != REVIEW_KIND {
        return Err(AdmissionError::BadRequest(format!(
            "unexpected kind: {:?} (expected {REVIEW_KIND})",
            review.kind
        )));
    }
    match &review.request {
        None => Err(AdmissionError::BadRequest("admission review has no request".into())),
        Some(req) if req.uid.is_empty() => {
            Err(AdmissionError::BadRequest("admission request has no uid".into()))
        }
        Some(_) => Ok(review),
    }
}

impl AdmissionReview {
    /// Build the response review for `uid` from a decision.
    pub fn respond(api_version: &str, uid: &str, decision: &Decision) -> Self {
        let status = if decision.allowed {
            None
        } else {
            Some(Status {
                code: DENIED_CODE,
                reason: "Invalid".into(),
                message: decision.message(),
                details: StatusDetails {
                    causes: decision
                        .violations
                        .iter()
                        .map(|v| StatusCause {
                            field: v.field.clone(),
                            reason: v.error_type.as_str().to_string(),
                            message: v.detail.clone(),
                        })
                        .collect(),
                },
            })
        };

        let api_version = if api_version.is_empty() {
            REVIEW_API_VERSION
        } else {
            api_version
        };

        Self {
            api_version: api_version.to_string(),
            kind: REVIEW_KIND.to_string(),
            request: None,
            response: Some(AdmissionResponse {
                uid: uid.to_string(),
                allowed: decision.allowed,
                status,
            }),
        }
    }
}

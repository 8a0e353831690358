//! Wire-level documents exchanged with the cluster API server.
//!
//! - `object`: group/version/kind descriptors and the object metadata subset
//!   plugins read (namespaces, labels, annotations).
//! - `review`: the AdmissionReview request/response envelope.
//!
//! Decoding is panic-free: a malformed review is reported as
//! `AdmissionError::BadRequest`, never by indexing into raw JSON.

pub mod object;
pub mod review;

pub use object::{GroupVersionKind, Namespace, ObjectMeta};
pub use review::{AdmissionRequest, AdmissionResponse, AdmissionReview};

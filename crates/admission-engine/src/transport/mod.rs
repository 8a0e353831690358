//! Transport layer: AdmissionReview over HTTP.

pub mod webhook;

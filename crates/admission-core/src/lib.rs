//! policy-admission core: request/response primitives, filters, violations and
//! the shared error surface.
//!
//! This crate defines the contracts shared by the engine, the plugins and the
//! webhook transport. It carries no runtime dependencies so it can be reused
//! by tooling that only needs to read or produce admission documents.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths surface as `AdmissionError`/`Result` so a malformed
//! review body can never take the webhook down.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod filter;
pub mod protocol;
pub mod violation;

/// Shared result type.
pub use error::{AdmissionError, Result};
pub use filter::{Filter, FilterKind};
pub use violation::{Decision, ErrorType, Violation};

//! Top-level facade crate for policy-admission.
//!
//! Re-exports the core types and the engine library so users can depend on a single crate.

pub mod core {
    pub use admission_core::*;
}

pub mod engine {
    pub use admission_engine::*;
}

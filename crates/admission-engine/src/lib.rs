//! policy-admission engine library entry.
//!
//! This crate wires the namespace cache, the script sandbox, the built-in
//! plugins and the dispatcher into an admission webhook. It is consumed by the
//! binary (`main.rs`) and by integration tests.

pub mod app_state;
pub mod cache;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod ops;
pub mod plugins;
pub mod router;
pub mod sandbox;
pub mod transport;

//! Dispatcher module exports.
//!
//! Re-exports the dispatcher and the plugin trait so plugins can depend on
//! this module directly.

pub mod dispatcher;

pub use dispatcher::{panic_message, Dispatcher, Plugin};

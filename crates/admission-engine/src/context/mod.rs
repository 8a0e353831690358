//! Per-request context shared with every plugin.

pub mod request;

pub use request::RequestContext;

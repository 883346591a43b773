//! HTTP transport
//!
//! Thin collaborator over the registry: a GET to a heartbeat route is
//! the liveness signal, plus health and monitoring read-outs.

pub mod handlers;
pub mod router;

pub use router::create_router;

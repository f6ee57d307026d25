//! Types shared by the treespace error and logging facilities
//!
//! Kept in their own crate so that log consumers can depend on the field
//! names and correlation ids without pulling in the engine.

pub mod correlation;
pub mod schema;

pub use correlation::{RequestContext, RequestId, TraceId};

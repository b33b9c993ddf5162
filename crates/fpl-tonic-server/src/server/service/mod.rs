//! gRPC service implementation and request lifecycle.
//!
//! This module contains the client-facing entry points. Each request is
//! validated, run through the aggregation [`pipeline`](crate::server::pipeline)
//! under its own deadline, and streamed back. Shutdown first refuses new work,
//! then drains in-flight streams.
//!
//! ## Structure
//!
//! - [`handler`] - gRPC service entry point (`FplService`).

pub mod handler;

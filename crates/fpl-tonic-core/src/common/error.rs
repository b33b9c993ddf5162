//! Error types for the occurrence service.
//!
//! This module defines the central `Error` enum, which captures every
//! reportable failure of the aggregation pipeline and its transport. It
//! implements `From<Error>` for `tonic::Status` so handlers can propagate
//! failures to gRPC clients with `?`.
//!
//! ## Error Cases
//! - `SourceUnavailable`: A remote Data Source call failed.
//! - `DecodeFailure`: A Data Source response did not have the expected shape.
//! - `EncodeFailure`: The CSV artifact could not be created or written.
//! - `IoFailure`: The CSV artifact could not be read back.
//! - `ChannelError`: An internal communication failure between tasks.
//! - `RequestCancelled`: The client went away mid-request.
//! - `InvalidRequest`: The client request was malformed or out of bounds.
//! - `DeadlineExceeded`: The request deadline expired mid-pipeline.
//! - `ServiceShutdown`: A request arrived while the service was shutting down.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the occurrence service.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The remote call failed before a response body could be read.
    #[error("Source unavailable: {context}")]
    SourceUnavailable { context: String },

    /// The remote response could not be decoded into the expected shape.
    #[error("Decode failure: {context}")]
    DecodeFailure { context: String },

    /// The artifact could not be created or written.
    #[error("Encode failure: {context}")]
    EncodeFailure { context: String },

    /// The artifact could not be opened or read.
    #[error("I/O failure: {context}")]
    IoFailure { context: String },

    /// Internal channel send/receive failure (e.g., closed channel).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The client aborted the request.
    #[error("Request cancelled by client")]
    RequestCancelled,

    /// The client request was invalid or exceeded constraints.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The request did not finish before its deadline.
    #[error("Request deadline exceeded")]
    DeadlineExceeded,

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::SourceUnavailable { context } => {
                Status::unavailable(format!("Source unavailable: {}", context))
            }
            Error::DecodeFailure { context } => {
                Status::internal(format!("Decode failure: {}", context))
            }
            Error::EncodeFailure { context } => {
                Status::internal(format!("Error while writing artifact: {}", context))
            }
            Error::IoFailure { context } => {
                Status::internal(format!("Error while reading artifact: {}", context))
            }
            Error::ChannelError { context } => {
                Status::internal(format!("Channel error: {}", context))
            }
            Error::RequestCancelled => Status::cancelled("Request was cancelled"),
            Error::InvalidRequest { reason } => Status::invalid_argument(reason),
            Error::DeadlineExceeded => Status::deadline_exceeded("Request deadline exceeded"),
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}

//! Protocol bindings, error taxonomy and domain types shared by the server and
//! client binaries.

pub mod error;
pub mod types;

pub use error::{Error, Result};

/// Generated gRPC bindings for the `fpl` package.
pub mod proto {
    tonic::include_proto!("fpl");

    /// Encoded file descriptor set, registered with the reflection service.
    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("fpl_descriptor");
}

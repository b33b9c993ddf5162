/// Builds the gRPC client and server code for the `fpl.proto` definition using
/// `tonic-prost-build`.
///
/// The `data` field of `AllGameweekData` is generated as `Bytes` so artifact
/// chunks can be handed to the transport without an extra copy.
///
/// Generated code is exposed through the crate's `proto` module:
///
/// ```rust
/// pub mod proto {
///     tonic::include_proto!("fpl");
/// }
/// ```
use std::env;
use std::path::PathBuf;
fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("fpl_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();

    config
        .bytes([".fpl.AllGameweekData.data"])
        .file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure()
        .compile_with_config(config, &["proto/fpl.proto"], &["proto"])
        .unwrap();
}

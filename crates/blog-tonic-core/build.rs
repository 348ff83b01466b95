/// Builds the gRPC client and server code for the `blog.proto` definition using
/// `tonic-prost-build`.
///
/// The generated modules land in the crate's `OUT_DIR` together with an encoded
/// file descriptor set, which the server hands to `tonic-reflection`.
///
/// # Files and Paths
///
/// - Proto file: `proto/blog.proto`
/// - Includes: `proto/`
/// - Descriptor: `$OUT_DIR/blog_descriptor.bin`
///
/// # Panics
///
/// Panics if code generation fails, which aborts the build with the
/// `protoc` diagnostics.
///
/// # Output
///
/// Generated code is accessible in Rust via:
///
/// ```rust,ignore
/// pub mod proto {
///     tonic::include_proto!("blog");
/// }
/// ```
use std::env;
use std::path::PathBuf;
fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("blog_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();
    config.file_descriptor_set_path(&descriptor_path);

    println!("cargo:rerun-if-changed=proto/blog.proto");

    tonic_prost_build::configure()
        .compile_with_config(config, &["proto/blog.proto"], &["proto"])
        .unwrap();
}

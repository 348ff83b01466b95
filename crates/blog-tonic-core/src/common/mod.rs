//! Shared protocol bindings, identifier types and errors.

pub mod error;
pub mod types;

pub use error::{Error, Result};

/// Code generated from `proto/blog.proto`.
pub mod proto {
    tonic::include_proto!("blog");

    /// Encoded file descriptor set for `tonic-reflection`.
    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("blog_descriptor");
}

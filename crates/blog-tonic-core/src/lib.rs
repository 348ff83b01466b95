#![doc = include_str!("../README.md")]

mod common;
pub use common::*;
// Public re-export so downstream crates share the exact `ObjectId` type used by
// `PostId` via `blog_tonic_core::bson`.
pub use bson;

//! Server-streaming support for `ListBlog`.
//!
//! - [`coordinator`] - forwards a store cursor into a response channel.
//! - [`tracker`] - counts open streams and coordinates shutdown.

pub mod coordinator;
pub mod tracker;

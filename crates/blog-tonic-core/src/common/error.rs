//! Error types for the blog post service.
//!
//! This module defines the central `Error` enum, which captures every
//! reportable failure of the service. It implements `From<Error>` for
//! `tonic::Status` so handlers can propagate errors with `?` and clients
//! receive the matching gRPC status code.
//!
//! ## Error Cases
//! - `InvalidId`: The supplied post identifier could not be parsed.
//! - `NotFound`: No post exists with the supplied identifier.
//! - `Storage`: The document store failed (network, write, decode).
//! - `ChannelError`: An internal communication failure between tasks.
//! - `ServiceShutdown`: A request arrived while the service was shutting down.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the blog post service.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The identifier is not a well-formed post id.
    #[error("Cannot parse ID: {id:?}")]
    InvalidId { id: String },

    /// No post is stored under the identifier.
    #[error("Cannot find blog with specified ID: {id}")]
    NotFound { id: String },

    /// The document store rejected or failed the operation.
    #[error("Storage error: {context}")]
    Storage { context: String },

    /// Internal channel send/receive failure (e.g., closed channel).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl Error {
    /// Wraps any displayable storage failure.
    pub fn storage(err: impl core::fmt::Display) -> Self {
        Self::Storage {
            context: err.to_string(),
        }
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidId { .. } => Status::invalid_argument(err.to_string()),
            Error::NotFound { .. } => Status::not_found(err.to_string()),
            Error::Storage { context } => Status::internal(format!("Internal error: {context}")),
            Error::ChannelError { context } => {
                Status::internal(format!("Channel error: {context}"))
            }
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}

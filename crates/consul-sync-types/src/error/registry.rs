//! Errors produced by registry agent calls.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A failed call to the registry agent.
///
/// `call` is the dotted call name (`agent.service.list`, `health.service`, ...)
/// so log lines can name the operation that failed.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum RegistryError {
    /// Connection refused, DNS failure, timeout...
    #[error("[consul.{call}] transport error: {message}")]
    Transport {
        /// Call name
        call: String,
        /// Underlying error text
        message: String,
    },

    /// The agent answered with a non-success HTTP status.
    #[error("[consul.{call}] HTTP {status}: {body}")]
    Status {
        /// Call name
        call: String,
        /// HTTP status code
        status: u16,
        /// Response body (may be empty)
        body: String,
    },

    /// The response body could not be decoded.
    #[error("[consul.{call}] invalid response: {message}")]
    Decode {
        /// Call name
        call: String,
        /// Decoder error text
        message: String,
    },
}

//! Error types for the match director.
//!
//! This module defines the central `Error` enum, which captures every failure
//! the pipeline can observe: transport and RPC failures against the backend,
//! allocator failures, profile loading, and shutdown.
//!
//! ## Error Cases
//! - `Transport`: The backend channel could not be established.
//! - `Rpc`: A backend RPC returned a non-OK status.
//! - `Stream`: A match stream session broke mid-flight.
//! - `DeadlineExceeded`: The population gate ran out of time.
//! - `Allocation` / `NoCapacity`: A single allocation attempt failed.
//! - `RetriesExhausted`: Allocation gave up after the backoff budget.
//! - `Unallocation`: A reservation could not be released.
//! - `InvalidProfile`: A profile document could not be loaded.
//! - `Callback`: A stream consumer asked to abort.
//! - `ServiceShutdown`: Work was interrupted by the shutdown signal.

use core::time::Duration;
use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the match director.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The gRPC channel to the backend could not be established.
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// A backend RPC completed with a non-OK status.
    #[error("RPC failed: {0}")]
    Rpc(#[from] Status),

    /// A match stream session failed.
    #[error("Stream error: {context}")]
    Stream { context: String },

    /// The population threshold was not observed before the deadline.
    #[error("Deadline of {deadline:?} exceeded")]
    DeadlineExceeded { deadline: Duration },

    /// The allocator rejected or failed a reservation request.
    #[error("Allocation failed: {reason}")]
    Allocation { reason: String },

    /// The fleet had no ready game server to hand out.
    #[error("No game server capacity available")]
    NoCapacity,

    /// Allocation kept failing until the retry budget ran out.
    #[error("Allocation retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: usize, last: Box<Error> },

    /// A reservation could not be resolved or released.
    #[error("Unallocation failed: {reason}")]
    Unallocation { reason: String },

    /// A profile document could not be loaded.
    #[error("Invalid profile {path}: {reason}")]
    InvalidProfile { path: String, reason: String },

    /// A stream consumer aborted consumption.
    #[error("Match callback failed: {reason}")]
    Callback { reason: String },

    /// The director is shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl Error {
    /// Returns `true` if a later allocation attempt may succeed.
    ///
    /// Capacity exhaustion and transient RPC failures are expected while a
    /// fleet scales; everything else is treated as final.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Allocation { .. } | Self::NoCapacity | Self::Rpc(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_failures_are_retryable() {
        assert!(Error::NoCapacity.is_retryable());
        assert!(
            Error::Allocation {
                reason: "fleet is scaling".to_string()
            }
            .is_retryable()
        );
        assert!(Error::Rpc(Status::unavailable("try again")).is_retryable());
    }

    #[test]
    fn terminal_failures_are_not_retryable() {
        assert!(!Error::ServiceShutdown.is_retryable());
        assert!(
            !Error::Stream {
                context: "reset by peer".to_string()
            }
            .is_retryable()
        );
        assert!(
            !Error::Unallocation {
                reason: "unknown game server".to_string()
            }
            .is_retryable()
        );
    }

    #[test]
    fn exhausted_retries_report_last_error() {
        let err = Error::RetriesExhausted {
            attempts: 7,
            last: Box::new(Error::NoCapacity),
        };
        assert_eq!(
            err.to_string(),
            "Allocation retries exhausted after 7 attempts: No game server capacity available"
        );
    }
}

//! Shared types and error definitions used by the match director.
//!
//! ## Submodules
//!
//! - [`error`] - Centralized error type used throughout the pipeline.
//! - [`types`] - Read-only projections over [`proto::MatchObject`].
//! - [`proto`] - Generated backend API messages and gRPC stubs.

pub mod error;
pub mod types;

pub use error::{Error, Result};

/// gRPC service and message definitions generated from `proto/backend.proto`
/// and `proto/messages.proto`.
///
/// ## Service
///
/// - `ListMatches` - Streams candidate matches for a profile until the client
///   closes the stream.
/// - `CreateAssignments` - Binds a connection string to every player in the
///   given rosters.
/// - `DeleteMatch` - Removes an unresolved match from backend state.
///
/// Both the client (`backend_client`) and server (`backend_server`) stubs are
/// generated. The director only uses the client; the server stub lets tests
/// stand up an in-process backend.
pub mod proto {
    tonic::include_proto!("api");
}

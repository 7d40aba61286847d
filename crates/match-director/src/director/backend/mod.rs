//! Matchmaking backend capability.
//!
//! The director never talks to a concrete client. It depends on
//! [`BackendApi`], the three RPCs of the backend service it actually uses, so
//! tests and alternate transports can be substituted at construction.
//!
//! - [`grpc`] - [`GrpcBackend`], the tonic implementation over one shared
//!   channel.

pub mod grpc;

pub use grpc::{Compression, GrpcBackend};

use core::pin::Pin;
use match_director_core::{
    Result,
    proto::{self, Assignments, MatchObject},
};
use tokio_stream::Stream;
use tonic::Status;

/// A server-streaming `ListMatches` response.
///
/// Dropping the stream cancels the RPC and releases the server-side session.
pub type MatchStream = Pin<Box<dyn Stream<Item = core::result::Result<MatchObject, Status>> + Send>>;

/// The backend RPCs consumed by the director.
///
/// Implementations must be safe for concurrent use by every worker and
/// per-match task; the director adds no locking around them.
#[tonic::async_trait]
pub trait BackendApi: Send + Sync + 'static {
    /// Opens a stream of candidate matches for `profile`.
    async fn list_matches(&self, profile: MatchObject) -> Result<MatchStream>;

    /// Publishes the connection string for every player in the rosters.
    async fn create_assignments(&self, assignments: Assignments) -> Result<proto::Result>;

    /// Removes an unresolved match from backend state. Only `id` is read.
    async fn delete_match(&self, m: MatchObject) -> Result<proto::Result>;
}

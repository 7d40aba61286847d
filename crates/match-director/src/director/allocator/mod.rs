//! Game server allocation capability.
//!
//! The director depends only on [`Allocator`]: reserve a game server for a
//! match, and release a reservation it obtained earlier. How a fleet picks a
//! server is the allocator's business.
//!
//! - [`agones`] - [`AgonesAllocator`], backed by Agones fleet allocations on
//!   Kubernetes.

pub mod agones;

pub use agones::{AgonesAllocator, AgonesConfig};

use core::fmt;
use match_director_core::{Result, proto::MatchObject};

/// Connection string of one reserved game server.
///
/// Not `Clone`: a handle has exactly one owner, the task processing the match
/// it was allocated for, and releasing the reservation consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct ConnectionHandle(String);

impl ConnectionHandle {
    pub fn new(connection: impl Into<String>) -> Self {
        Self(connection.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reserves and releases game servers.
///
/// `allocate` may be called repeatedly for the same match and each call may
/// create a new reservation; deduplication is not assumed by the caller.
#[tonic::async_trait]
pub trait Allocator: Send + Sync + 'static {
    /// Reserves one game server sized and labeled for `m`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCapacity`] when the fleet has nothing to hand out,
    /// or [`Error::Allocation`] when the request itself failed.
    ///
    /// [`Error::NoCapacity`]: match_director_core::Error::NoCapacity
    /// [`Error::Allocation`]: match_director_core::Error::Allocation
    async fn allocate(&self, m: &MatchObject) -> Result<ConnectionHandle>;

    /// Releases the reservation identified by `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unallocation`] when the handle does not resolve to a
    /// live reservation or the release request fails.
    ///
    /// [`Error::Unallocation`]: match_director_core::Error::Unallocation
    async fn unallocate(&self, handle: ConnectionHandle) -> Result<()>;
}

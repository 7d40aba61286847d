//! Validation and the per-match saga.

use super::Director;
use crate::director::{allocator::ConnectionHandle, telemetry};
use core::fmt;
use match_director_core::{
    Error, Result,
    proto::{Assignments, MatchObject},
    types::{backend_error, has_valid_properties, player_ids},
};
use tokio::time::Instant;
use tracing::Instrument;

/// Why a received match was discarded without being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The backend flagged the match with an error.
    BackendError,
    /// The match properties are not a JSON document.
    InvalidProperties,
}

impl RejectReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BackendError => "backend_error",
            Self::InvalidProperties => "invalid_properties",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decides whether a received match is worth allocating for.
///
/// # Errors
///
/// Returns the [`RejectReason`] for matches carrying a backend error or
/// malformed properties.
pub fn validate(m: &MatchObject) -> core::result::Result<(), RejectReason> {
    if backend_error(m).is_some() {
        return Err(RejectReason::BackendError);
    }
    if !has_valid_properties(m) {
        return Err(RejectReason::InvalidProperties);
    }
    Ok(())
}

/// Terminal state of one processed match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// A game server was allocated and the assignment accepted.
    Assigned { connection: String },
    /// No game server could be allocated. `deleted` tells whether the
    /// compensating `DeleteMatch` succeeded.
    AllocationFailed { deleted: bool },
    /// The assignment was refused after a successful allocation. `released`
    /// tells whether the game server was released.
    AssignmentFailed { released: bool },
}

impl MatchOutcome {
    pub const fn is_assigned(&self) -> bool {
        matches!(self, Self::Assigned { .. })
    }
}

impl Director {
    /// Runs the two-phase saga for one validated match.
    ///
    /// Never fails: every error is contained here and reported through the
    /// returned [`MatchOutcome`] and the logs.
    pub async fn process_match(&self, m: MatchObject) -> MatchOutcome {
        telemetry::increment_matches_inflight();
        let span = tracing::info_span!("process_match", r#match = %m.id);
        let outcome = self.run_saga(&m).instrument(span).await;
        telemetry::decrement_matches_inflight();
        outcome
    }

    async fn run_saga(&self, m: &MatchObject) -> MatchOutcome {
        let started = Instant::now();
        let allocated = self.allocate_with_retry(m).await;
        telemetry::record_allocation_duration(started.elapsed().as_secs_f64() * 1_000.0);

        match allocated {
            Ok(handle) => {
                telemetry::increment_allocations();
                self.commit_assignment(m, handle).await
            }
            Err(e) => {
                if matches!(e, Error::RetriesExhausted { .. }) {
                    telemetry::increment_allocations_exhausted();
                }
                tracing::error!(r#match = %m.id, error = %e, "Failed to allocate game server");
                MatchOutcome::AllocationFailed {
                    deleted: self.delete_match(m).await,
                }
            }
        }
    }

    /// Attempt phase. The first attempt is immediate; later ones follow the
    /// backoff delays. An attempt that has started always completes and its
    /// success is kept, even past the budget.
    async fn allocate_with_retry(&self, m: &MatchObject) -> Result<ConnectionHandle> {
        let mut backoff = self.inner.settings.backoff.start();
        let mut attempts = 0;

        loop {
            attempts += 1;
            let last = match self.inner.allocator.allocate(m).await {
                Ok(handle) => {
                    tracing::info!(
                        r#match = %m.id,
                        connection = %handle,
                        attempts,
                        "Game server allocated"
                    );
                    return Ok(handle);
                }
                Err(e) => e,
            };
            telemetry::increment_allocation_attempt_failures();

            if !last.is_retryable() {
                return Err(last);
            }
            let Some(delay) = backoff.next_delay() else {
                return Err(Error::RetriesExhausted {
                    attempts,
                    last: Box::new(last),
                });
            };

            tracing::debug!(
                r#match = %m.id,
                attempts,
                delay = ?delay,
                error = %last,
                "Allocation attempt failed, retrying"
            );
            tokio::select! {
                biased;
                () = self.inner.shutdown.cancelled() => return Err(Error::ServiceShutdown),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Commit phase. The assignment is sent once; if it is refused the
    /// reservation is released instead of retrying the delivery.
    async fn commit_assignment(&self, m: &MatchObject, handle: ConnectionHandle) -> MatchOutcome {
        let assignments = Assignments {
            rosters: m.rosters.clone(),
            assignment: handle.as_str().to_string(),
        };

        let refused = match self.inner.backend.create_assignments(assignments).await {
            Ok(result) if result.error.is_empty() => None,
            Ok(result) => Some(result.error),
            Err(e) => Some(e.to_string()),
        };

        let Some(reason) = refused else {
            telemetry::increment_assignments();
            tracing::info!(
                r#match = %m.id,
                connection = %handle,
                players = ?player_ids(m),
                "Assignment created"
            );
            return MatchOutcome::Assigned {
                connection: handle.into_inner(),
            };
        };

        telemetry::increment_assignment_failures();
        tracing::error!(
            r#match = %m.id,
            connection = %handle,
            players = ?player_ids(m),
            error = %reason,
            "Failed to create assignments"
        );

        let connection = handle.to_string();
        let released = match self.inner.allocator.unallocate(handle).await {
            Ok(()) => {
                tracing::info!(r#match = %m.id, connection = %connection, "Game server released");
                true
            }
            Err(e) => {
                telemetry::increment_compensation_failures("unallocate");
                tracing::error!(
                    r#match = %m.id,
                    connection = %connection,
                    error = %e,
                    "Failed to release game server"
                );
                false
            }
        };
        MatchOutcome::AssignmentFailed { released }
    }

    async fn delete_match(&self, m: &MatchObject) -> bool {
        let target = MatchObject {
            id: m.id.clone(),
            ..Default::default()
        };

        let failure = match self.inner.backend.delete_match(target).await {
            Ok(result) if result.error.is_empty() => None,
            Ok(result) => Some(result.error),
            Err(e) => Some(e.to_string()),
        };

        match failure {
            None => {
                tracing::info!(r#match = %m.id, "Match deleted");
                true
            }
            Some(reason) => {
                telemetry::increment_compensation_failures("delete_match");
                tracing::error!(r#match = %m.id, error = %reason, "Failed to delete match");
                false
            }
        }
    }
}

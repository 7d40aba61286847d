//! The match director.
//!
//! A [`Director`] runs one worker per profile. Each worker repeatedly opens a
//! `ListMatches` session, validates what it receives and hands every accepted
//! match to its own task, which runs the per-match saga:
//!
//! 1. **Allocate**: call the [`Allocator`] under the [`BackoffPolicy`] until it
//!    succeeds or the budget runs out. On exhaustion, delete the match from the
//!    backend.
//! 2. **Commit**: submit one assignment for the match's rosters. If the
//!    backend refuses it, release the game server.
//!
//! Neither compensation is retried. Their failures are logged and reflected
//! in the [`MatchOutcome`].
//!
//! ## Submodules
//!
//! - [`worker`] - Per-profile session loop and its [`WorkerReport`].
//! - [`processor`] - Validation and the per-match saga.

pub mod processor;
pub mod worker;

pub use processor::{MatchOutcome, RejectReason, validate};
pub use worker::WorkerReport;

use crate::director::{allocator::Allocator, backend::BackendApi, backoff::BackoffPolicy};
use core::time::Duration;
use match_director_core::proto::MatchObject;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Tunables for workers and the per-match saga.
#[derive(Debug, Clone)]
pub struct DirectorSettings {
    /// Sessions opened per profile. `None` repeats until shutdown.
    pub max_sends: Option<usize>,
    /// Accepted matches per session before it is closed early. `None` reads
    /// until the server ends the stream.
    pub max_matches_per_send: Option<usize>,
    /// Pause between two sessions of the same profile.
    pub sleep_between_sends: Duration,
    /// Stagger between two worker launches.
    pub wait_between_startups: Duration,
    /// Allocation retry policy.
    pub backoff: BackoffPolicy,
}

impl Default for DirectorSettings {
    fn default() -> Self {
        Self {
            max_sends: Some(2),
            max_matches_per_send: Some(2),
            sleep_between_sends: Duration::from_secs(30),
            wait_between_startups: Duration::from_secs(2),
            backoff: BackoffPolicy::default(),
        }
    }
}

struct Inner {
    backend: Arc<dyn BackendApi>,
    allocator: Arc<dyn Allocator>,
    settings: DirectorSettings,
    shutdown: CancellationToken,
}

/// Orchestrates workers and per-match processing.
///
/// Cloning is cheap; all clones share the same collaborators and shutdown
/// token.
#[derive(Clone)]
pub struct Director {
    inner: Arc<Inner>,
}

impl Director {
    pub fn new(
        backend: Arc<dyn BackendApi>,
        allocator: Arc<dyn Allocator>,
        settings: DirectorSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                allocator,
                settings,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn settings(&self) -> &DirectorSettings {
        &self.inner.settings
    }

    /// Runs one worker per profile and waits for all of them, including the
    /// matches they still have in flight.
    ///
    /// Workers are launched `wait_between_startups` apart. A shutdown during
    /// the stagger stops further launches.
    pub async fn run(&self, profiles: Vec<MatchObject>) -> Vec<WorkerReport> {
        let mut handles = Vec::with_capacity(profiles.len());

        for (i, profile) in profiles.into_iter().enumerate() {
            if i > 0 {
                tokio::select! {
                    biased;
                    () = self.inner.shutdown.cancelled() => {
                        tracing::info!("Shutdown requested, not starting remaining profiles");
                        break;
                    }
                    () = tokio::time::sleep(self.inner.settings.wait_between_startups) => {}
                }
            }

            tracing::info!(profile = %profile.id, "Starting worker");
            let id = profile.id.clone();
            handles.push((id, tokio::spawn(worker::run(self.clone(), profile))));
        }

        let (ids, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        futures::future::join_all(handles)
            .await
            .into_iter()
            .zip(ids)
            .map(|(joined, id)| match joined {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!(profile = %id, "Worker task failed: {e}");
                    let mut report = WorkerReport::new(id);
                    report.error = Some(e.to_string());
                    report
                }
            })
            .collect()
    }

    /// Stops workers between items and during sleeps, and interrupts
    /// allocation retries waiting on a backoff delay.
    pub fn shutdown(&self) {
        tracing::info!("Director shutdown requested");
        self.inner.shutdown.cancel();
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }
}

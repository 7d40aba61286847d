//! Per-profile worker loop.
//!
//! A worker opens up to `max_sends` sessions for its profile, one after the
//! other. Consumption is sequential, but every accepted match is processed in
//! its own task so a slow allocation never holds up the next item. Those tasks
//! live in a per-worker [`JoinSet`]: finished ones are reaped while the worker
//! runs, and the rest are awaited before the worker reports.

use super::{Director, MatchOutcome, validate};
use crate::director::{stream::MatchStreamClient, telemetry};
use match_director_core::{Error, proto::MatchObject};
use tokio::task::{JoinError, JoinSet};
use tracing::Instrument;

/// What one worker did with its profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub profile: String,
    /// Sessions opened.
    pub sessions: usize,
    /// Matches received across all sessions.
    pub received: usize,
    /// Matches that passed validation and were processed.
    pub accepted: usize,
    /// Matches discarded by validation.
    pub rejected: usize,
    pub assigned: usize,
    pub allocation_failed: usize,
    pub assignment_failed: usize,
    /// Why the worker stopped early, if it did.
    pub error: Option<String>,
}

impl WorkerReport {
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            ..Default::default()
        }
    }

    /// Number of matches that reached a terminal saga outcome.
    pub const fn outcomes(&self) -> usize {
        self.assigned + self.allocation_failed + self.assignment_failed
    }

    fn record(&mut self, joined: core::result::Result<MatchOutcome, JoinError>) {
        match joined {
            Ok(MatchOutcome::Assigned { .. }) => self.assigned += 1,
            Ok(MatchOutcome::AllocationFailed { .. }) => self.allocation_failed += 1,
            Ok(MatchOutcome::AssignmentFailed { .. }) => self.assignment_failed += 1,
            Err(e) => {
                tracing::error!(profile = %self.profile, "Match task failed: {e}");
            }
        }
    }
}

pub(super) async fn run(director: Director, profile: MatchObject) -> WorkerReport {
    let settings = director.settings().clone();
    let shutdown = director.shutdown_token();
    let client = MatchStreamClient::new(director.inner.backend.clone(), shutdown.clone());

    let mut report = WorkerReport::new(profile.id.clone());
    let mut tasks: JoinSet<MatchOutcome> = JoinSet::new();
    let mut send = 0;

    loop {
        if settings.max_sends.is_some_and(|max| send >= max) || shutdown.is_cancelled() {
            break;
        }
        send += 1;
        report.sessions += 1;

        let mut recv = 0;
        let mut accepted = 0;
        let consumed = client
            .consume(&profile, |m| {
                recv += 1;
                report.received += 1;
                telemetry::increment_matches_received();

                if let Err(reason) = validate(&m) {
                    report.rejected += 1;
                    telemetry::increment_matches_rejected(reason.as_str());
                    tracing::warn!(
                        profile = %profile.id,
                        send,
                        recv,
                        r#match = %m.id,
                        reason = %reason,
                        error = m.error.as_str(),
                        "Discarding match"
                    );
                    return Ok(true);
                }

                accepted += 1;
                report.accepted += 1;
                tracing::info!(profile = %profile.id, send, recv, r#match = %m.id, "Match received");

                let span = tracing::info_span!("match", profile = %profile.id, send, recv);
                let director = director.clone();
                tasks.spawn(async move { director.process_match(m).await }.instrument(span));

                while let Some(joined) = tasks.try_join_next() {
                    report.record(joined);
                }

                let keep_going = settings
                    .max_matches_per_send
                    .is_none_or(|cap| accepted < cap);
                if !keep_going {
                    tracing::debug!(profile = %profile.id, send, "Session match cap reached, closing stream");
                }
                Ok(keep_going)
            })
            .await;

        match consumed {
            Ok(received) => {
                tracing::info!(profile = %profile.id, send, received, accepted, "Session finished");
            }
            Err(e @ Error::Stream { .. }) => {
                tracing::error!(profile = %profile.id, send, error = %e, "Session broke, moving on");
            }
            Err(e) => {
                tracing::error!(profile = %profile.id, send, error = %e, "Failed to open session, stopping worker");
                report.error = Some(e.to_string());
                break;
            }
        }

        let last = settings.max_sends.is_some_and(|max| send >= max);
        if last {
            break;
        }
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            () = tokio::time::sleep(settings.sleep_between_sends) => {}
        }
        while let Some(joined) = tasks.try_join_next() {
            report.record(joined);
        }
    }

    while let Some(joined) = tasks.join_next().await {
        report.record(joined);
    }

    tracing::info!(
        profile = %report.profile,
        sessions = report.sessions,
        received = report.received,
        accepted = report.accepted,
        rejected = report.rejected,
        assigned = report.assigned,
        allocation_failed = report.allocation_failed,
        assignment_failed = report.assignment_failed,
        "Worker finished"
    );
    report
}

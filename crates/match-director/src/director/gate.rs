//! Population gate.
//!
//! Before any real profile is dispatched, the director waits until the
//! backend reports enough indexed players. The starter profile's matchmaking
//! function fills the [`DEFAULT_POOL`] pool stats with the total population;
//! the gate reads successive results until that count exceeds the threshold.

use crate::director::backend::BackendApi;
use crate::director::stream::MatchSession;
use core::time::Duration;
use match_director_core::{
    Error, Result,
    proto::MatchObject,
    types::{DEFAULT_POOL, default_pool_player_count},
};

/// Waits until the population reported for `starter` exceeds `threshold`.
///
/// Opens a single session and returns:
/// - `Ok(true)` as soon as a result reports more than `threshold` players,
/// - `Ok(false)` if the server ends the stream first.
///
/// The session is closed on every path, including the deadline.
///
/// # Errors
///
/// Returns [`Error::DeadlineExceeded`] if `deadline` elapses first, or the
/// stream error if the session cannot be opened or breaks.
pub async fn wait_for_population(
    backend: &dyn BackendApi,
    starter: &MatchObject,
    threshold: i64,
    deadline: Duration,
) -> Result<bool> {
    tracing::info!(
        profile = %starter.id,
        threshold,
        deadline = ?deadline,
        "Waiting for players"
    );

    match tokio::time::timeout(deadline, read_until_reached(backend, starter, threshold)).await {
        Ok(reached) => reached,
        Err(_) => {
            tracing::warn!(profile = %starter.id, deadline = ?deadline, "Population gate deadline exceeded");
            Err(Error::DeadlineExceeded { deadline })
        }
    }
}

async fn read_until_reached(
    backend: &dyn BackendApi,
    starter: &MatchObject,
    threshold: i64,
) -> Result<bool> {
    // Dropped with the future on timeout, which closes the stream.
    let mut session = MatchSession::open(backend, starter).await?;

    while let Some(m) = session.next_match().await? {
        let Some(count) = default_pool_player_count(&m) else {
            tracing::debug!(profile = %starter.id, pool = DEFAULT_POOL, "Result carries no population stats");
            continue;
        };

        if count > threshold {
            tracing::info!(profile = %starter.id, players = count, threshold, "Population threshold reached");
            session.close();
            return Ok(true);
        }
        tracing::info!(profile = %starter.id, players = count, threshold, "Not enough players yet");
    }

    tracing::warn!(profile = %starter.id, threshold, "Matches stream ended before population threshold");
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::director::backend::MatchStream;
    use match_director_core::proto::{self, Assignments, PlayerPool, Stats};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tonic::Status;

    struct PopulationBackend {
        counts: Vec<Option<i64>>,
        hang: bool,
        opened: AtomicUsize,
    }

    impl PopulationBackend {
        fn new(counts: Vec<Option<i64>>, hang: bool) -> Self {
            Self {
                counts,
                hang,
                opened: AtomicUsize::new(0),
            }
        }
    }

    fn population(count: Option<i64>) -> MatchObject {
        MatchObject {
            id: "starter".to_string(),
            pools: vec![PlayerPool {
                name: DEFAULT_POOL.to_string(),
                stats: count.map(|count| Stats {
                    count,
                    elapsed: 0.0,
                }),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[tonic::async_trait]
    impl BackendApi for PopulationBackend {
        async fn list_matches(&self, _profile: MatchObject) -> Result<MatchStream> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            let items: Vec<core::result::Result<MatchObject, Status>> =
                self.counts.iter().map(|&c| Ok(population(c))).collect();
            let head = tokio_stream::iter(items);
            if self.hang {
                use tokio_stream::StreamExt;
                Ok(Box::pin(head.chain(tokio_stream::pending())))
            } else {
                Ok(Box::pin(head))
            }
        }

        async fn create_assignments(&self, _assignments: Assignments) -> Result<proto::Result> {
            unreachable!("gate never assigns")
        }

        async fn delete_match(&self, _m: MatchObject) -> Result<proto::Result> {
            unreachable!("gate never deletes")
        }
    }

    fn starter() -> MatchObject {
        MatchObject {
            id: "starter".to_string(),
            properties: "{}".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn reached_when_count_exceeds_threshold() {
        let backend = PopulationBackend::new(vec![Some(5), None, Some(21)], false);
        let reached = wait_for_population(&backend, &starter(), 20, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(reached);
    }

    #[tokio::test]
    async fn equal_count_is_not_enough() {
        let backend = PopulationBackend::new(vec![Some(20)], false);
        let reached = wait_for_population(&backend, &starter(), 20, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!reached);
    }

    #[tokio::test]
    async fn not_reached_twice_on_clean_end() {
        let backend = PopulationBackend::new(vec![Some(1), Some(2)], false);
        for _ in 0..2 {
            let reached = wait_for_population(&backend, &starter(), 20, Duration::from_secs(5))
                .await
                .unwrap();
            assert!(!reached);
        }
        assert_eq!(backend.opened.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_exceeded_when_stream_stalls() {
        let backend = PopulationBackend::new(vec![Some(3)], true);
        let err = wait_for_population(&backend, &starter(), 20, Duration::from_secs(30))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DeadlineExceeded { deadline } if deadline == Duration::from_secs(30)));
    }
}

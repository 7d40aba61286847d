use super::MatchSession;
use crate::director::backend::BackendApi;
use match_director_core::{Result, proto::MatchObject};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Drives match stream sessions against a shared backend.
#[derive(Clone)]
pub struct MatchStreamClient {
    backend: Arc<dyn BackendApi>,
    shutdown: CancellationToken,
}

impl MatchStreamClient {
    pub fn new(backend: Arc<dyn BackendApi>, shutdown: CancellationToken) -> Self {
        Self { backend, shutdown }
    }

    /// Opens one session for `profile` and feeds each received match to
    /// `on_match`, in arrival order.
    ///
    /// Consumption stops, and the session is closed, when:
    /// - `on_match` returns `Ok(false)`,
    /// - the server ends the stream,
    /// - the shutdown token is cancelled while waiting for the next item,
    /// - `on_match` fails or the transport fails (the error is returned).
    ///
    /// Returns the number of matches received.
    ///
    /// # Errors
    ///
    /// Returns the error that stopped consumption: a failure to open the
    /// session, a transport error mid-stream, or the callback's own error.
    pub async fn consume<F>(&self, profile: &MatchObject, mut on_match: F) -> Result<usize>
    where
        F: FnMut(MatchObject) -> Result<bool>,
    {
        let mut session = MatchSession::open(self.backend.as_ref(), profile).await?;

        loop {
            let next = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    tracing::debug!(profile = %profile.id, "Shutdown requested, closing matches stream");
                    break;
                }
                next = session.next_match() => next?,
            };

            let Some(m) = next else {
                break;
            };

            match on_match(m) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    session.close();
                    return Err(e);
                }
            }
        }

        session.close();
        Ok(session.received())
    }
}

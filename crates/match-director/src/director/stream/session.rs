use crate::director::backend::{BackendApi, MatchStream};
use match_director_core::{Error, Result, proto::MatchObject};
use tokio_stream::StreamExt;

/// One open `ListMatches` session.
///
/// Holds at most one in-flight receive. Once the server ends the stream, an
/// error is received, or [`close`](Self::close) is called, the underlying RPC
/// is released and later calls to [`next_match`](Self::next_match) return
/// `Ok(None)`.
pub struct MatchSession {
    profile_id: String,
    inner: Option<MatchStream>,
    received: usize,
}

impl MatchSession {
    /// Opens a new session for `profile`.
    ///
    /// # Errors
    ///
    /// Returns the backend's error unchanged if it refuses to open the stream,
    /// so callers can tell a failed open apart from a broken session
    /// ([`Error::Stream`]).
    pub async fn open(backend: &dyn BackendApi, profile: &MatchObject) -> Result<Self> {
        let inner = backend
            .list_matches(profile.clone())
            .await
            .inspect_err(|e| {
                tracing::warn!(profile = %profile.id, error = %e, "Failed to open matches stream");
            })?;

        tracing::trace!(profile = %profile.id, "Opened matches stream");
        Ok(Self {
            profile_id: profile.id.clone(),
            inner: Some(inner),
            received: 0,
        })
    }

    /// Waits for the next match.
    ///
    /// Returns `Ok(None)` when the server ends the stream without error or the
    /// session was already closed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stream`] when the transport fails. The session is
    /// closed before the error is returned.
    pub async fn next_match(&mut self) -> Result<Option<MatchObject>> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(None);
        };

        match inner.next().await {
            Some(Ok(m)) => {
                self.received += 1;
                Ok(Some(m))
            }
            Some(Err(status)) => {
                self.close();
                Err(Error::Stream {
                    context: format!("error receiving match for {}: {status}", self.profile_id),
                })
            }
            None => {
                tracing::debug!(profile = %self.profile_id, "Matches stream ended by server");
                self.inner = None;
                Ok(None)
            }
        }
    }

    /// Releases the underlying RPC. Idempotent.
    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            tracing::trace!(
                profile = %self.profile_id,
                received = self.received,
                "Closed matches stream"
            );
        }
    }

    /// Number of matches received so far.
    pub const fn received(&self) -> usize {
        self.received
    }
}

impl Drop for MatchSession {
    fn drop(&mut self) {
        self.close();
    }
}

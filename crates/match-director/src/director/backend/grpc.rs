//! gRPC implementation of [`BackendApi`].

use super::{BackendApi, MatchStream};
use clap::ValueEnum;
use core::{fmt, time::Duration};
use match_director_core::{
    Result,
    proto::{self, Assignments, MatchObject, backend_client::BackendClient},
};
use tonic::{
    codec::CompressionEncoding,
    transport::{Channel, Endpoint},
};

/// Compression applied to backend RPCs in both directions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Compression {
    #[default]
    None,
    Deflate,
    Gzip,
    Zstd,
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Deflate => write!(f, "deflate"),
            Compression::Gzip => write!(f, "gzip"),
            Compression::Zstd => write!(f, "zstd"),
        }
    }
}

impl From<Compression> for Option<CompressionEncoding> {
    fn from(value: Compression) -> Self {
        match value {
            Compression::None => None,
            Compression::Deflate => Some(CompressionEncoding::Deflate),
            Compression::Gzip => Some(CompressionEncoding::Gzip),
            Compression::Zstd => Some(CompressionEncoding::Zstd),
        }
    }
}

/// Backend client over a single shared [`Channel`].
///
/// Tonic channels multiplex requests over one HTTP/2 connection and are cheap
/// to clone, so every call clones the generated client instead of locking a
/// shared one.
#[derive(Clone, Debug)]
pub struct GrpcBackend {
    client: BackendClient<Channel>,
}

impl GrpcBackend {
    /// Wraps an already established channel.
    pub fn new(channel: Channel, compression: Compression) -> Self {
        let mut client = BackendClient::new(channel);
        if let Some(encoding) = Option::<CompressionEncoding>::from(compression) {
            client = client
                .send_compressed(encoding)
                .accept_compressed(encoding);
        }
        Self { client }
    }

    /// Connects to the backend at `addr`, failing if it cannot be reached
    /// within `connect_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the address is malformed or the
    /// connection cannot be established.
    ///
    /// [`Error::Transport`]: match_director_core::Error::Transport
    pub async fn connect(
        addr: String,
        connect_timeout: Duration,
        compression: Compression,
    ) -> Result<Self> {
        let channel = Endpoint::from_shared(addr)?
            .connect_timeout(connect_timeout)
            .tcp_nodelay(true)
            .connect()
            .await?;
        Ok(Self::new(channel, compression))
    }
}

#[tonic::async_trait]
impl BackendApi for GrpcBackend {
    async fn list_matches(&self, profile: MatchObject) -> Result<MatchStream> {
        let stream = self
            .client
            .clone()
            .list_matches(profile)
            .await?
            .into_inner();
        Ok(Box::pin(stream))
    }

    async fn create_assignments(&self, assignments: Assignments) -> Result<proto::Result> {
        let res = self
            .client
            .clone()
            .create_assignments(assignments)
            .await?;
        Ok(res.into_inner())
    }

    async fn delete_match(&self, m: MatchObject) -> Result<proto::Result> {
        // The backend only reads the id.
        let req = MatchObject {
            id: m.id,
            ..Default::default()
        };
        let res = self.client.clone().delete_match(req).await?;
        Ok(res.into_inner())
    }
}

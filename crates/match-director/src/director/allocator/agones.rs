//! Agones fleet allocator.
//!
//! Reserves game servers by creating `stable.agones.dev/v1alpha1`
//! `FleetAllocation` objects through the Kubernetes API, authenticated with
//! the pod's service account. The connection string handed back to the
//! director is `<address>:<first port>` of the allocated game server.
//!
//! Releasing a reservation resolves the connection string back to the game
//! server in state `Allocated` with that address and port, and deletes it.

use super::{Allocator, ConnectionHandle};
use core::time::Duration;
use match_director_core::{Error, Result, proto::MatchObject};
use reqwest::{Certificate, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

const API_GROUP_VERSION: &str = "stable.agones.dev/v1alpha1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection and placement parameters for [`AgonesAllocator`].
#[derive(Debug, Clone)]
pub struct AgonesConfig {
    /// Namespace the fleet lives in.
    pub namespace: String,
    /// Fleet to allocate game servers from.
    pub fleet_name: String,
    /// Name prefix for created `FleetAllocation` objects.
    pub generate_name: String,
    /// Base URL of the Kubernetes API server.
    pub api_server: String,
    /// Service account bearer token. Re-read on every request so rotated
    /// tokens are picked up.
    pub token_path: PathBuf,
    /// CA bundle used to verify the API server, if any.
    pub ca_path: Option<PathBuf>,
}

/// [`Allocator`] backed by an Agones fleet.
#[derive(Debug, Clone)]
pub struct AgonesAllocator {
    client: Client,
    config: AgonesConfig,
}

impl AgonesAllocator {
    /// Builds the HTTP client, trusting the configured CA bundle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Allocation`] if the CA bundle cannot be read or parsed,
    /// or the client cannot be built.
    pub async fn new(config: AgonesConfig) -> Result<Self> {
        let mut builder = Client::builder().timeout(REQUEST_TIMEOUT);

        if let Some(ca_path) = &config.ca_path {
            let pem = tokio::fs::read(ca_path).await.map_err(|e| Error::Allocation {
                reason: format!("failed to read CA bundle {}: {e}", ca_path.display()),
            })?;
            let cert = Certificate::from_pem(&pem).map_err(|e| Error::Allocation {
                reason: format!("invalid CA bundle {}: {e}", ca_path.display()),
            })?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder.build().map_err(|e| Error::Allocation {
            reason: format!("failed to build Kubernetes client: {e}"),
        })?;

        tracing::info!(
            namespace = %config.namespace,
            fleet = %config.fleet_name,
            generate_name = %config.generate_name,
            "Agones allocator ready"
        );
        Ok(Self { client, config })
    }

    fn resource_url(&self, resource: &str) -> String {
        format!(
            "{}/apis/{API_GROUP_VERSION}/namespaces/{}/{resource}",
            self.config.api_server.trim_end_matches('/'),
            self.config.namespace
        )
    }

    async fn token(&self) -> Result<String> {
        let token = tokio::fs::read_to_string(&self.config.token_path)
            .await
            .map_err(|e| Error::Allocation {
                reason: format!(
                    "failed to read service account token {}: {e}",
                    self.config.token_path.display()
                ),
            })?;
        Ok(token.trim().to_string())
    }

    async fn list_game_servers(&self) -> Result<Vec<GameServer>> {
        let token = self.token().await.map_err(unallocation)?;
        let resp = self
            .client
            .get(self.resource_url("gameservers"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::Unallocation {
                reason: format!("failed to get game servers list: {e}"),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Unallocation {
                reason: format!("failed to get game servers list ({status}): {body}"),
            });
        }

        let list: GameServerList = resp.json().await.map_err(|e| Error::Unallocation {
            reason: format!("malformed game servers list: {e}"),
        })?;
        Ok(list.items)
    }
}

#[tonic::async_trait]
impl Allocator for AgonesAllocator {
    async fn allocate(&self, m: &MatchObject) -> Result<ConnectionHandle> {
        let request = FleetAllocationRequest {
            api_version: API_GROUP_VERSION,
            kind: "FleetAllocation",
            metadata: NewObjectMeta {
                generate_name: &self.config.generate_name,
                namespace: &self.config.namespace,
            },
            spec: FleetAllocationSpec {
                fleet_name: &self.config.fleet_name,
                metadata: allocation_meta(m),
            },
        };

        let token = self.token().await?;
        let resp = self
            .client
            .post(self.resource_url("fleetallocations"))
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Allocation {
                reason: format!("failed to create fleet allocation: {e}"),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Allocation {
                reason: format!("failed to create fleet allocation ({status}): {body}"),
            });
        }

        let allocation: FleetAllocation = resp.json().await.map_err(|e| Error::Allocation {
            reason: format!("malformed fleet allocation: {e}"),
        })?;
        let game_server = allocation.status.game_server.ok_or(Error::NoCapacity)?;
        let connection = connection_string(&game_server)?;

        tracing::info!(
            fleet_allocation = %allocation.metadata.name,
            game_server = %game_server.metadata.name,
            connection = %connection,
            "GameServer allocated"
        );
        Ok(ConnectionHandle::new(connection))
    }

    async fn unallocate(&self, handle: ConnectionHandle) -> Result<()> {
        let (ip, port) = parse_connection(handle.as_str())?;
        let game_servers = self.list_game_servers().await?;

        let Some(game_server) = find_allocated(&game_servers, ip, port) else {
            return Err(Error::Unallocation {
                reason: format!("found no game servers matching {handle}"),
            });
        };
        let name = &game_server.metadata.name;

        let token = self.token().await.map_err(unallocation)?;
        let resp = self
            .client
            .delete(format!("{}/{name}", self.resource_url("gameservers")))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::Unallocation {
                reason: format!("failed to delete game server {name}: {e}"),
            })?;

        let status = resp.status();
        // Already gone counts as released.
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(connection = %handle, game_server = %name, "Failed to delete game server");
            return Err(Error::Unallocation {
                reason: format!("failed to delete game server {name} ({status}): {body}"),
            });
        }

        tracing::info!(connection = %handle, game_server = %name, "GameServer deleted");
        Ok(())
    }
}

fn unallocation(e: Error) -> Error {
    Error::Unallocation {
        reason: e.to_string(),
    }
}

/// Labels and annotations attached to the allocated game server.
#[derive(Serialize, Debug, Default, PartialEq, Eq)]
pub struct MetaPatch {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

/// Builds the metadata patch for a match: its id as a label, and its pools
/// and rosters as JSON annotations.
pub fn allocation_meta(m: &MatchObject) -> MetaPatch {
    let mut meta = MetaPatch::default();
    meta.labels
        .insert("openmatch/match".to_string(), m.id.clone());

    match serde_json::to_string(&m.pools) {
        Ok(pools) => {
            meta.annotations
                .insert("openmatch/pools".to_string(), pools);
        }
        Err(e) => {
            tracing::error!(r#match = %m.id, error = %e, "Could not serialize pools for allocation metadata");
        }
    }
    match serde_json::to_string(&m.rosters) {
        Ok(rosters) => {
            meta.annotations
                .insert("openmatch/rosters".to_string(), rosters);
        }
        Err(e) => {
            tracing::error!(r#match = %m.id, error = %e, "Could not serialize rosters for allocation metadata");
        }
    }
    meta
}

/// Splits a connection string into `(ip, port)`.
///
/// # Errors
///
/// Returns [`Error::Unallocation`] unless the string has exactly one `:`.
pub fn parse_connection(connection: &str) -> Result<(&str, &str)> {
    let mut parts = connection.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(ip), Some(port), None) => Ok((ip, port)),
        _ => Err(Error::Unallocation {
            reason: format!(
                "unable to parse connection string {connection:?}: expecting format \"<IP>:<PORT>\""
            ),
        }),
    }
}

fn connection_string(game_server: &GameServer) -> Result<String> {
    let port = game_server
        .status
        .ports
        .first()
        .ok_or(Error::NoCapacity)?;
    if game_server.status.address.is_empty() {
        return Err(Error::NoCapacity);
    }
    Ok(format!("{}:{}", game_server.status.address, port.port))
}

fn find_allocated<'a>(items: &'a [GameServer], ip: &str, port: &str) -> Option<&'a GameServer> {
    items.iter().find(|gs| {
        gs.status.state == "Allocated"
            && gs.status.address == ip
            && gs.status.ports.iter().any(|p| p.port.to_string() == port)
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FleetAllocationRequest<'a> {
    api_version: &'static str,
    kind: &'static str,
    metadata: NewObjectMeta<'a>,
    spec: FleetAllocationSpec<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewObjectMeta<'a> {
    generate_name: &'a str,
    namespace: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FleetAllocationSpec<'a> {
    fleet_name: &'a str,
    metadata: MetaPatch,
}

#[derive(Deserialize, Debug, Default)]
struct ObjectMeta {
    #[serde(default)]
    name: String,
}

#[derive(Deserialize, Debug)]
struct FleetAllocation {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    status: FleetAllocationStatus,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct FleetAllocationStatus {
    #[serde(default)]
    game_server: Option<GameServer>,
}

#[derive(Deserialize, Debug)]
struct GameServerList {
    #[serde(default)]
    items: Vec<GameServer>,
}

#[derive(Deserialize, Debug)]
struct GameServer {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    status: GameServerStatus,
}

#[derive(Deserialize, Debug, Default)]
struct GameServerStatus {
    #[serde(default)]
    state: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    ports: Vec<GameServerPort>,
}

#[derive(Deserialize, Debug)]
struct GameServerPort {
    port: i32,
}

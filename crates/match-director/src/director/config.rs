use crate::director::{
    allocator::AgonesConfig, backend::Compression, backoff::BackoffPolicy,
    pipeline::DirectorSettings,
};
use anyhow::bail;
use clap::{Parser, ValueEnum};
use core::time::Duration;
use std::path::PathBuf;

/// Largest accepted backoff growth factor.
const MAX_ALLOCATION_MULTIPLIER: f64 = 100.0;

/// Console log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Runtime configuration for the `match-director` binary.
///
/// Every value can be given as a flag or through the environment variable
/// named next to it. Caps given as `0` or a negative number mean unbounded.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "match-director",
    version,
    about = "Allocates game servers for matchmaking results and publishes assignments"
)]
pub struct CliArgs {
    /// Backend gRPC endpoint.
    ///
    /// Environment variable: `BACKEND_ADDR`
    #[arg(long, env = "BACKEND_ADDR", default_value_t = String::from("http://om-backendapi:50505"))]
    pub backend_addr: String,

    /// Seconds to wait for the backend connection at startup.
    ///
    /// Environment variable: `CONNECT_TIMEOUT_SECS`
    #[arg(long, env = "CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    pub connect_timeout_secs: u64,

    /// Compression applied to backend RPCs.
    ///
    /// Environment variable: `COMPRESSION`
    #[arg(long, env = "COMPRESSION", value_enum, default_value_t = Compression::None)]
    pub compression: Compression,

    /// Profile used to wait for enough players before dispatching.
    ///
    /// Environment variable: `STARTER_PROFILE`
    #[arg(long, env = "STARTER_PROFILE", default_value = "profiles/__empty__.json")]
    pub starter_profile: PathBuf,

    /// Comma separated profile documents, one worker each.
    ///
    /// Environment variable: `PROFILES`
    #[arg(long, env = "PROFILES", value_delimiter = ',', required = true)]
    pub profiles: Vec<PathBuf>,

    /// Population that must be exceeded before dispatch starts.
    ///
    /// Environment variable: `MIN_PLAYERS`
    #[arg(long, env = "MIN_PLAYERS", default_value_t = 20)]
    pub min_players: i64,

    /// Seconds to wait for the population before giving up.
    ///
    /// Environment variable: `MAX_WAIT_SECS`
    #[arg(long, env = "MAX_WAIT_SECS", default_value_t = 3600)]
    pub max_wait_secs: u64,

    /// Sessions per profile.
    ///
    /// Environment variable: `MAX_SENDS`
    #[arg(long, env = "MAX_SENDS", default_value_t = 2, allow_negative_numbers = true)]
    pub max_sends: i64,

    /// Accepted matches per session.
    ///
    /// Environment variable: `MAX_MATCHES_PER_SEND`
    #[arg(long, env = "MAX_MATCHES_PER_SEND", default_value_t = 2, allow_negative_numbers = true)]
    pub max_matches_per_send: i64,

    /// Seconds between two sessions of one profile.
    ///
    /// Environment variable: `SLEEP_BETWEEN_SENDS_SECS`
    #[arg(long, env = "SLEEP_BETWEEN_SENDS_SECS", default_value_t = 30)]
    pub sleep_between_sends_secs: u64,

    /// Seconds between two worker launches.
    ///
    /// Environment variable: `WAIT_BETWEEN_STARTUPS_SECS`
    #[arg(long, env = "WAIT_BETWEEN_STARTUPS_SECS", default_value_t = 2)]
    pub wait_between_startups_secs: u64,

    /// First allocation retry delay, in milliseconds.
    ///
    /// Environment variable: `ALLOCATION_INITIAL_INTERVAL_MS`
    #[arg(long, env = "ALLOCATION_INITIAL_INTERVAL_MS", default_value_t = 2000)]
    pub allocation_initial_interval_ms: u64,

    /// Growth factor between allocation retry delays.
    ///
    /// Environment variable: `ALLOCATION_MULTIPLIER`
    #[arg(long, env = "ALLOCATION_MULTIPLIER", default_value_t = 1.5)]
    pub allocation_multiplier: f64,

    /// Longest single allocation retry delay, in seconds.
    ///
    /// Environment variable: `ALLOCATION_MAX_INTERVAL_SECS`
    #[arg(long, env = "ALLOCATION_MAX_INTERVAL_SECS", default_value_t = 60)]
    pub allocation_max_interval_secs: u64,

    /// Budget for all allocation attempts of one match, in seconds.
    ///
    /// Environment variable: `ALLOCATION_MAX_ELAPSED_SECS`
    #[arg(long, env = "ALLOCATION_MAX_ELAPSED_SECS", default_value_t = 120)]
    pub allocation_max_elapsed_secs: u64,

    /// Namespace of the game server fleet.
    ///
    /// Environment variable: `AGONES_NAMESPACE`
    #[arg(long, env = "AGONES_NAMESPACE", default_value_t = String::from("default"))]
    pub agones_namespace: String,

    /// Fleet to allocate game servers from.
    ///
    /// Environment variable: `AGONES_FLEET_NAME`
    #[arg(long, env = "AGONES_FLEET_NAME", default_value_t = String::from("udp-server"))]
    pub agones_fleet_name: String,

    /// Name prefix of created fleet allocations.
    ///
    /// Environment variable: `AGONES_GENERATE_NAME`
    #[arg(long, env = "AGONES_GENERATE_NAME", default_value_t = String::from("udp-server-"))]
    pub agones_generate_name: String,

    /// Kubernetes API server URL. Derived from the in-cluster service
    /// environment when unset.
    ///
    /// Environment variable: `KUBE_API_SERVER`
    #[arg(long, env = "KUBE_API_SERVER")]
    pub kube_api_server: Option<String>,

    #[arg(long, env = "KUBERNETES_SERVICE_HOST", hide = true)]
    pub kube_service_host: Option<String>,

    #[arg(long, env = "KUBERNETES_SERVICE_PORT", hide = true, default_value_t = 443)]
    pub kube_service_port: u16,

    /// Service account token file.
    ///
    /// Environment variable: `KUBE_TOKEN_PATH`
    #[arg(
        long,
        env = "KUBE_TOKEN_PATH",
        default_value = "/var/run/secrets/kubernetes.io/serviceaccount/token"
    )]
    pub kube_token_path: PathBuf,

    /// CA bundle for the API server. Empty to use the system roots only.
    ///
    /// Environment variable: `KUBE_CA_PATH`
    #[arg(
        long,
        env = "KUBE_CA_PATH",
        default_value_t = String::from("/var/run/secrets/kubernetes.io/serviceaccount/ca.crt")
    )]
    pub kube_ca_path: String,

    /// Console log format.
    ///
    /// Environment variable: `LOG_FORMAT`
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct DirectorConfig {
    pub backend_addr: String,
    pub connect_timeout: Duration,
    pub compression: Compression,
    pub starter_profile: PathBuf,
    pub profiles: Vec<PathBuf>,
    pub min_players: i64,
    pub max_wait: Duration,
    pub max_sends: Option<usize>,
    pub max_matches_per_send: Option<usize>,
    pub sleep_between_sends: Duration,
    pub wait_between_startups: Duration,
    pub backoff: BackoffPolicy,
    pub agones: AgonesConfig,
    pub log_format: LogFormat,
}

impl DirectorConfig {
    pub fn director_settings(&self) -> DirectorSettings {
        DirectorSettings {
            max_sends: self.max_sends,
            max_matches_per_send: self.max_matches_per_send,
            sleep_between_sends: self.sleep_between_sends,
            wait_between_startups: self.wait_between_startups,
            backoff: self.backoff,
        }
    }
}

/// `<= 0` means unbounded.
fn cap(value: i64) -> Option<usize> {
    usize::try_from(value).ok().filter(|&n| n > 0)
}

impl TryFrom<CliArgs> for DirectorConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.profiles.is_empty() || args.profiles.iter().any(|p| p.as_os_str().is_empty()) {
            bail!("PROFILES must name at least one profile document");
        }

        if args.connect_timeout_secs == 0 {
            bail!("CONNECT_TIMEOUT_SECS must be greater than 0");
        }

        if args.max_wait_secs == 0 {
            bail!("MAX_WAIT_SECS must be greater than 0");
        }

        if args.allocation_initial_interval_ms == 0 {
            bail!("ALLOCATION_INITIAL_INTERVAL_MS must be greater than 0");
        }

        if !(1.0..=MAX_ALLOCATION_MULTIPLIER).contains(&args.allocation_multiplier) {
            bail!(
                "ALLOCATION_MULTIPLIER ({}) must be between 1.0 and {MAX_ALLOCATION_MULTIPLIER}",
                args.allocation_multiplier
            );
        }

        let initial_interval = Duration::from_millis(args.allocation_initial_interval_ms);
        let max_interval = Duration::from_secs(args.allocation_max_interval_secs);
        if max_interval < initial_interval {
            bail!(
                "ALLOCATION_MAX_INTERVAL_SECS ({:?}) must not be shorter than ALLOCATION_INITIAL_INTERVAL_MS ({:?})",
                max_interval,
                initial_interval
            );
        }

        if args.allocation_max_elapsed_secs == 0 {
            bail!("ALLOCATION_MAX_ELAPSED_SECS must be greater than 0");
        }

        let api_server = match (args.kube_api_server, args.kube_service_host) {
            (Some(url), _) => url,
            (None, Some(host)) if host.contains(':') => {
                format!("https://[{host}]:{}", args.kube_service_port)
            }
            (None, Some(host)) => format!("https://{host}:{}", args.kube_service_port),
            (None, None) => bail!(
                "KUBE_API_SERVER is not set and KUBERNETES_SERVICE_HOST is unavailable (not running in a cluster?)"
            ),
        };

        let ca_path = (!args.kube_ca_path.is_empty()).then(|| PathBuf::from(args.kube_ca_path));

        Ok(Self {
            backend_addr: args.backend_addr,
            connect_timeout: Duration::from_secs(args.connect_timeout_secs),
            compression: args.compression,
            starter_profile: args.starter_profile,
            profiles: args.profiles,
            min_players: args.min_players,
            max_wait: Duration::from_secs(args.max_wait_secs),
            max_sends: cap(args.max_sends),
            max_matches_per_send: cap(args.max_matches_per_send),
            sleep_between_sends: Duration::from_secs(args.sleep_between_sends_secs),
            wait_between_startups: Duration::from_secs(args.wait_between_startups_secs),
            backoff: BackoffPolicy {
                initial_interval,
                multiplier: args.allocation_multiplier,
                max_interval,
                max_elapsed_time: Duration::from_secs(args.allocation_max_elapsed_secs),
            },
            agones: AgonesConfig {
                namespace: args.agones_namespace,
                fleet_name: args.agones_fleet_name,
                generate_name: args.agones_generate_name,
                api_server,
                token_path: args.kube_token_path,
                ca_path,
            },
            log_format: args.log_format,
        })
    }
}

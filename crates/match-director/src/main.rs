#![doc = include_str!("../README.md")]

use clap::Parser;
use match_director::director::{
    allocator::AgonesAllocator,
    backend::GrpcBackend,
    config::{CliArgs, DirectorConfig},
    gate::wait_for_population,
    pipeline::{Director, WorkerReport},
    profile::load_profiles,
    telemetry::init_telemetry,
};
use std::sync::Arc;
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = DirectorConfig::try_from(args)?;

    let providers = init_telemetry(config.log_format)?;

    let result = run(config).await;
    if let Err(e) = &result {
        tracing::error!("Director failed: {e:#}");
    }

    providers.shutdown();
    result
}

async fn run(config: DirectorConfig) -> anyhow::Result<()> {
    log_startup_info(&config);

    let (starter, profiles) = load_profiles(&config.starter_profile, &config.profiles).await?;

    let backend = Arc::new(
        GrpcBackend::connect(
            config.backend_addr.clone(),
            config.connect_timeout,
            config.compression,
        )
        .await?,
    );
    tracing::info!(addr = %config.backend_addr, "Connected to backend");

    let allocator = Arc::new(AgonesAllocator::new(config.agones.clone()).await?);

    let gate = wait_for_population(
        backend.as_ref(),
        &starter,
        config.min_players,
        config.max_wait,
    );
    let reached = tokio::select! {
        reached = gate => reached?,
        () = shutdown_signal() => {
            tracing::info!("Shutdown before dispatch started");
            return Ok(());
        }
    };
    if !reached {
        tracing::warn!(
            threshold = config.min_players,
            "Population threshold not reached, dispatching anyway"
        );
    }

    let director = Director::new(backend, allocator, config.director_settings());
    let running = director.run(profiles);
    tokio::pin!(running);

    let reports = tokio::select! {
        reports = &mut running => reports,
        () = shutdown_signal() => {
            tracing::info!("Shutdown signal received, draining workers...");
            director.shutdown();
            running.await
        }
    };

    log_reports(&reports);
    tracing::info!("Director finished");
    Ok(())
}

fn log_startup_info(config: &DirectorConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting match director with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting match director against {} with {} profiles",
            config.backend_addr,
            config.profiles.len()
        );
    }
}

fn log_reports(reports: &[WorkerReport]) {
    for report in reports {
        if let Some(error) = &report.error {
            tracing::error!(profile = %report.profile, error = %error, "Worker stopped early");
        }
        tracing::info!(
            profile = %report.profile,
            sessions = report.sessions,
            accepted = report.accepted,
            rejected = report.rejected,
            assigned = report.assigned,
            allocation_failed = report.allocation_failed,
            assignment_failed = report.assignment_failed,
            "Profile summary"
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }
}

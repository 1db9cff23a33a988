//! hotkey-guard: hotkey-triggered code challenge daemon
//!
//! This daemon runs in the background and provides:
//! - Global chord detection (Control+K, then Control+8 or Control+T)
//! - Brute-force lockout with persisted state and an audit trail
//! - Best-effort remote revocation of the code on lockout
//! - IPC server through which a UI answers challenges and reads status

mod clock;
mod config;
mod events;
mod guard;
mod hotkey;
mod ipc;
mod lifecycle;
mod lockout;
mod revocation;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::clock::{Clock, SystemClock};
use crate::config::{client_identity, AppSettings, Config};
use crate::events::GuardEvent;
use crate::guard::{BrokerPrompt, Guard, GuardContext};
use crate::hotkey::{platform_sampler, IdleSampler, KeySampler};
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::lockout::{EventLog, LockoutPolicy, StateStore};
use crate::revocation::{HttpRemoteApi, RemoteApi, RevocationCoordinator, UnconfiguredApi};

/// Upper bound on waiting for in-flight revocations at shutdown
const REVOCATION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "hotkey-guard starting");

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(data_dir = ?config.data_dir, "configuration loaded");

    let settings = AppSettings::load(&config.settings_path);
    let mut shutdown = ShutdownSignal::new().context("failed to register signal handlers")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let security_log = EventLog::new(&config.security_log_path, Arc::clone(&clock));
    let request_log = EventLog::new(&config.request_log_path, Arc::clone(&clock));

    // Guard -> IPC subscribers
    let (event_tx, _event_rx) = broadcast::channel::<GuardEvent>(64);

    let api: Arc<dyn RemoteApi> =
        match HttpRemoteApi::new(&settings.api_endpoint, &settings.api_token) {
            Ok(api) => Arc::new(api),
            Err(e) => {
                error!(error = %e, "remote API unavailable, revocation will fail");
                Arc::new(UnconfiguredApi::new(&settings.api_endpoint, e.to_string()))
            }
        };

    let coordinator = Arc::new(
        RevocationCoordinator::new(
            Arc::clone(&api),
            security_log.clone(),
            Arc::clone(&clock),
            client_identity(),
            Handle::current(),
        )
        .with_events(event_tx.clone()),
    );

    let policy = LockoutPolicy::restore(
        StateStore::new(&config.state_path),
        security_log,
        Arc::clone(&clock),
    )
    .with_listener(coordinator.clone())
    .with_events(event_tx.clone());
    info!(status = %policy.status_message(), "lockout state restored");

    let ctx = GuardContext::new(policy, settings, &config.settings_path, event_tx.clone());
    let prompt = Arc::new(BrokerPrompt::new(ctx.broker.clone(), event_tx.clone()));
    let mut guard = Guard::new(ctx.clone(), prompt, api, request_log);

    // Key sampling needs platform support and input monitoring permission
    let sampler: Box<dyn KeySampler> = match platform_sampler() {
        Ok(sampler) => {
            info!("key sampler started");
            sampler
        }
        Err(e) => {
            error!(error = %e, "failed to start key sampler");
            warn!("continuing without hotkey support");
            Box::new(IdleSampler)
        }
    };
    let hotkey_registered = sampler.is_live();

    let server = Server::new(&config.socket_path, ctx, hotkey_registered)?;

    info!("daemon initialized, entering main loop");

    tokio::select! {
        _ = guard.run(sampler) => {
            info!("guard loop exited");
        }

        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    let outcomes = coordinator.drain(REVOCATION_DRAIN_TIMEOUT).await;
    if !outcomes.is_empty() {
        info!(completed = outcomes.len(), "revocation tasks drained");
    }
    server.shutdown().await;

    info!("hotkey-guard stopped");

    Ok(())
}

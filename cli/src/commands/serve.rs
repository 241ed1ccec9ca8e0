// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `bastion serve`: run the ledger HTTP API until Ctrl+C or SIGTERM.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use bastion_ledger_core::application::runtime::LedgerRuntime;
use bastion_ledger_core::infrastructure::AuditLog;
use bastion_ledger_core::presentation::{router, ApiState};

pub async fn run(config_override: Option<PathBuf>, port: Option<u16>) -> Result<()> {
    let config = super::load_config(config_override.as_deref()).context("Failed to load configuration")?;
    let runtime = LedgerRuntime::from_config(config).context("Failed to initialize ledger runtime")?;

    let network = &runtime.config.spec.network;
    let bind_addr = format!("{}:{}", network.bind_address, port.unwrap_or(network.port));

    let audit_log = AuditLog::new(&runtime.event_bus);
    let audit_shutdown = audit_log.shutdown_token();
    let audit_task = audit_log.start();

    let sweeper = runtime.sweeper();
    let sweeper_shutdown = sweeper.shutdown_token();
    let sweeper_task = sweeper.start();

    let app = router(Arc::new(ApiState::from_runtime(&runtime)));

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    info!(address = %bind_addr, "Ledger API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    sweeper_shutdown.cancel();
    if let Err(e) = sweeper_task.await {
        warn!(error = %e, "Ledger sweeper task ended abnormally");
    }

    audit_shutdown.cancel();
    match audit_task.await {
        Ok(logged) => info!(logged, "Audit log drained"),
        Err(e) => warn!(error = %e, "Audit log task ended abnormally"),
    }

    info!("Ledger daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

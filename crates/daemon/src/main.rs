// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `wqd`: the admin-facing daemon binary. Parses CLI flags, loads
//! `Config`, installs a `tracing-subscriber` registry, then runs a
//! [`wq_daemon::Daemon`] until SIGINT/SIGTERM (spec §6 "Logging",
//! SPEC_FULL.md ambient-stack supplement 1 "Graceful shutdown").

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use wq_daemon::{Config, Daemon, LoggingHandler};

#[derive(Parser, Debug)]
#[command(name = "wqd", about = "Distributed work-queue worker daemon")]
struct Args {
    /// Path to a TOML config file. Falls back to defaults plus `WQ_*` env
    /// overrides when omitted.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Emit structured JSON logs instead of human-readable ones. Overrides
    /// the `json_logs` config value / `WQ_JSON_LOGS` env var when set.
    #[arg(long)]
    json_logs: bool,
}

fn install_tracing(json_logs: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref()).context("loading wqd configuration")?;
    if args.json_logs {
        config.json_logs = true;
    }
    install_tracing(config.json_logs);

    tracing::info!(
        backend = %config.store.backend,
        workers = config.worker.count,
        tenant = ?config.tenant,
        "starting wqd"
    );

    let daemon = Daemon::new(config, Arc::new(LoggingHandler)).await.context("building daemon")?;

    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        wait_for_termination().await;
        tracing::info!("shutdown signal received, draining in-flight work");
        signal_shutdown.cancel();
    });

    daemon.run(shutdown).await.context("daemon run loop exited with an error")?;
    tracing::info!("wqd stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(err) => {
            tracing::warn!(%err, "failed to install SIGTERM handler, falling back to SIGINT only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    let _ = tokio::signal::ctrl_c().await;
}

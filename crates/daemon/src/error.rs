// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon-level error taxonomy (spec §7), thin enough that `main.rs` can
//! still collapse everything into `anyhow` at the outermost edge.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
    #[error(transparent)]
    Store(#[from] wq_storage::StoreError),
    #[error(transparent)]
    Engine(#[from] wq_engine::EngineError),
}

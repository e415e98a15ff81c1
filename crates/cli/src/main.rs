// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `wqctl`: the admin CLI (SPEC_FULL.md §2 ambient component "Admin CLI").
//!
//! Talks to the store directly through the same `Config`/`AnyStore`
//! construction the `wqd` daemon uses, rather than over an IPC protocol to
//! a running daemon process — the platform this crate administers is a
//! library of store operations, not a service with its own wire protocol,
//! so there is nothing an IPC hop would add over opening the store
//! directly (see DESIGN.md for the full rationale).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use wq_core::{Clock, Job, JobId, PriorityClass, Scope, SystemClock, TenantId};
use wq_daemon::{AnyStore, Config};
use wq_engine::dlq::{analyze, DlqStore};
use wq_engine::RemediationEngine;
use wq_storage::{DlqFilter, DlqSortKey, StoreClient};

#[derive(Parser, Debug)]
#[command(name = "wqctl", about = "Admin CLI for the work-queue platform")]
struct Args {
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enqueue a job onto a priority queue.
    Enqueue {
        #[arg(long)]
        tenant: Option<String>,
        #[arg(long)]
        queue: String,
        #[arg(long, default_value = "normal")]
        priority: String,
        #[arg(long)]
        payload: String,
        #[arg(long)]
        job_type: Option<String>,
        #[arg(long, default_value_t = 3)]
        max_retries: u32,
    },
    /// Print a snapshot of queue depths, DLQ depth, and breaker state.
    Status,
    #[command(subcommand)]
    Dlq(DlqCommand),
}

#[derive(Subcommand, Debug)]
enum DlqCommand {
    /// List dead-lettered entries, newest-failed first.
    List {
        #[arg(long)]
        queue: Option<String>,
        #[arg(long)]
        job_type: Option<String>,
        #[arg(long)]
        tenant: Option<String>,
        #[arg(long, default_value_t = 0)]
        page: usize,
        #[arg(long, default_value_t = 20)]
        page_size: usize,
    },
    /// Show one entry in full.
    Show { id: String },
    /// Requeue one entry back onto its source queue.
    Requeue { id: String },
    /// Drop one entry without requeueing it.
    Purge { id: String },
    /// Requeue many entries by id.
    BulkRequeue {
        ids: Vec<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Purge many entries by id.
    BulkPurge {
        ids: Vec<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Purge every entry matching a filter.
    PurgeAll {
        #[arg(long)]
        queue: Option<String>,
        #[arg(long)]
        job_type: Option<String>,
        #[arg(long)]
        tenant: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Cluster dead-lettered entries into recurring error patterns.
    Analyze,
}

fn filter_from(queue: Option<String>, job_type: Option<String>, tenant: Option<String>) -> DlqFilter {
    DlqFilter { queue, job_type, tenant_id: tenant, ..Default::default() }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref()).context("loading wqctl configuration")?;
    let store = Arc::new(AnyStore::connect(&config.store).await.context("connecting to store")?);

    match args.command {
        Command::Enqueue { tenant, queue, priority, payload, job_type, max_retries } => {
            enqueue(&store, &config, tenant, queue, priority, payload, job_type, max_retries).await
        }
        Command::Status => status(&store, &config).await,
        Command::Dlq(cmd) => dlq(&store, &config, cmd).await,
    }
}

async fn enqueue(
    store: &Arc<AnyStore>,
    config: &Config,
    tenant: Option<String>,
    queue: String,
    priority: String,
    payload: String,
    job_type: Option<String>,
    max_retries: u32,
) -> anyhow::Result<()> {
    let tenant = tenant.or_else(|| config.tenant.clone());
    // Allow expect: the literal satisfies the tenant-id grammar by construction.
    #[allow(clippy::expect_used)]
    let tenant_id = tenant
        .as_deref()
        .map(|t| TenantId::parse(t.to_string()))
        .transpose()
        .context("invalid tenant id")?
        .unwrap_or_else(|| TenantId::parse("default-tenant").expect("literal satisfies tenant grammar"));
    let scope = match &tenant {
        Some(_) => Scope::Tenant(tenant_id.clone()),
        None => Scope::Global,
    };
    // Allow expect: PriorityClass::from_str has an infallible Custom(_) fallback.
    #[allow(clippy::expect_used)]
    let priority_class: PriorityClass = priority.parse().expect("PriorityClass::from_str never errors");

    let job = Job {
        job_id: JobId::new(),
        tenant_id,
        queue: queue.clone(),
        priority_class: priority_class.clone(),
        payload: payload.into_bytes(),
        created_at_ms: SystemClock.epoch_ms(),
        retries: 0,
        max_retries,
        trace_id: None,
        span_id: None,
        file_size_hint: None,
        job_type,
        extra: Default::default(),
    };

    let encoded = wq_wire::encode(&job).context("encoding job")?;
    store.list_push_back(&scope.queue_key(&priority_class), encoded).await.context("enqueueing job")?;
    println!("enqueued {} onto {}:{}", job.job_id, queue, priority_class);
    Ok(())
}

async fn status(store: &Arc<AnyStore>, config: &Config) -> anyhow::Result<()> {
    use wq_breaker::CircuitState;
    let scope = config.scope();
    let report = wq_daemon::status::assemble(
        store,
        &scope,
        0,
        config.worker.count,
        CircuitState::Closed,
        0,
        0,
    )
    .await
    .context("assembling status report")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn dlq(store: &Arc<AnyStore>, config: &Config, cmd: DlqCommand) -> anyhow::Result<()> {
    let clock = SystemClock;
    let remediation = RemediationEngine::new(Arc::clone(store), clock, config.remediation.bulk_op_limit);
    let dlq_store = DlqStore::new(Arc::clone(store));

    match cmd {
        DlqCommand::List { queue, job_type, tenant, page, page_size } => {
            let filter = filter_from(queue, job_type, tenant);
            let entries = dlq_store.list_all().await?;
            let paged = wq_storage::paginate(entries, &filter, DlqSortKey::FailedAt, page, page_size);
            println!("{}", serde_json::to_string_pretty(&serde_json::json!({
                "total": paged.total,
                "page": paged.page,
                "page_size": paged.page_size,
                "has_next": paged.has_next(),
                "entries": paged.entries,
            }))?);
        }
        DlqCommand::Show { id } => match dlq_store.get(&id).await? {
            Some(entry) => println!("{}", serde_json::to_string_pretty(&entry)?),
            None => anyhow::bail!("dlq entry {id} not found"),
        },
        DlqCommand::Requeue { id } => {
            remediation.requeue(&id, "wqctl").await?;
            println!("requeued {id}");
        }
        DlqCommand::Purge { id } => {
            remediation.purge(&id, "wqctl").await?;
            println!("purged {id}");
        }
        DlqCommand::BulkRequeue { ids, dry_run } => {
            let result = remediation.bulk_requeue(&ids, "wqctl", dry_run).await?;
            print_bulk_result(&result);
        }
        DlqCommand::BulkPurge { ids, dry_run } => {
            let result = remediation.bulk_purge(&ids, "wqctl", dry_run).await?;
            print_bulk_result(&result);
        }
        DlqCommand::PurgeAll { queue, job_type, tenant, dry_run } => {
            let filter = filter_from(queue, job_type, tenant);
            let result = remediation.purge_all(&filter, "wqctl", dry_run).await?;
            print_bulk_result(&result);
        }
        DlqCommand::Analyze => {
            let entries = dlq_store.list_all().await?;
            let patterns = analyze(&entries);
            println!("{}", serde_json::to_string_pretty(&patterns_as_json(&patterns))?);
        }
    }
    Ok(())
}

fn print_bulk_result(result: &wq_engine::BulkResult) {
    println!(
        "{{\"total_requested\": {}, \"successful\": {}, \"failed\": {}, \"dry_run\": {}, \"duration_ms\": {}}}",
        result.total_requested,
        result.successful.len(),
        result.failed.len(),
        result.dry_run,
        result.duration_ms()
    );
    for failure in &result.failed {
        eprintln!("  failed: {} ({})", failure.id, failure.error);
    }
}

/// `ErrorPattern` doesn't derive `Serialize` (it isn't persisted, only
/// displayed), so the CLI's JSON rendering is built explicitly here rather
/// than adding a serde dependency to the analyzer's output type.
fn patterns_as_json(patterns: &[wq_engine::dlq::ErrorPattern]) -> serde_json::Value {
    serde_json::Value::Array(
        patterns
            .iter()
            .map(|p| {
                serde_json::json!({
                    "signature": p.signature,
                    "normalized_message": p.normalized_message,
                    "count": p.count,
                    "first_seen_ms": p.first_seen_ms,
                    "last_seen_ms": p.last_seen_ms,
                    "affected_queues": p.affected_queues,
                    "affected_types": p.affected_types,
                    "sample_entry_ids": p.sample_entry_ids.iter().map(|id| id.as_str().to_string()).collect::<Vec<_>>(),
                    "severity": format!("{:?}", p.severity),
                    "suggested_action": p.suggested_action,
                })
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_from_only_sets_provided_fields() {
        let filter = filter_from(Some("emails".to_string()), None, None);
        assert_eq!(filter.queue.as_deref(), Some("emails"));
        assert!(filter.job_type.is_none());
        assert!(filter.tenant_id.is_none());
    }
}

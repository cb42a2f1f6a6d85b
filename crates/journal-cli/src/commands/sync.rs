use std::path::Path;

use journal_core::models::{ConflictRecord, EntryId, Resolution};
use journal_core::state::SyncPhase;
use journal_core::sync::{NetworkState, SyncOutcome, SyncReport, SyncScheduler, SyncTracker};
use tokio::sync::watch;

use crate::cli::SyncCommands;
use crate::commands::common::{
    build_coordinator, conflict_to_item, format_conflict_lines, format_sync_timestamp,
    load_remote_config, normalize_entry_identifier, open_store, short_id, ConflictItem,
};
use crate::error::CliError;

pub async fn run_sync_command(
    command: Option<SyncCommands>,
    db_path: &Path,
    config_path: &Path,
) -> Result<(), CliError> {
    match command {
        None => run_sync(db_path, config_path).await,
        Some(SyncCommands::Status) => run_sync_status(db_path).await,
        Some(SyncCommands::Conflicts { json }) => run_sync_conflicts(json, db_path).await,
        Some(SyncCommands::Resolve { id, keep }) => {
            run_sync_resolve(&id, keep.into(), db_path).await
        }
        Some(SyncCommands::Watch) => run_sync_watch(db_path, config_path).await,
    }
}

pub async fn run_sync(db_path: &Path, config_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    if !store.load_policy().await?.sync_enabled {
        println!("Sync is disabled. Enable it with `journal config set --enabled true`.");
        return Ok(());
    }

    let config = load_remote_config(config_path)?;
    let coordinator = build_coordinator(&store, &config)?;

    match coordinator.synchronize().await {
        SyncOutcome::Success(report) => {
            println!("{}", format_report(&report));
            print_conflict_hint(&report);
        }
        SyncOutcome::PartialFailure { report, failed } => {
            println!("{}", format_report(&report));
            for failure in &failed {
                eprintln!(
                    "Skipped {}: {}",
                    short_id(&failure.id.to_string()),
                    failure.message
                );
            }
            println!("{} entries will be retried on the next sync.", failed.len());
            print_conflict_hint(&report);
        }
        SyncOutcome::Fatal(error) => return Err(error.into()),
        SyncOutcome::Skipped => println!("Another sync pass is already running."),
    }
    Ok(())
}

pub async fn run_sync_status(db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let tracker = SyncTracker::new(store.clone());
    let global = tracker.global_state().await?;
    let modified = tracker.modified_since_last_sync().await?;
    let conflicts = tracker.conflict_records().await?;
    let policy = store.load_policy().await?;

    println!("Device:        {}", global.device_id);
    println!(
        "Last sync:     {}",
        format_sync_timestamp(global.last_sync_timestamp)
    );
    println!("Pending:       {}", modified.len());
    println!("Conflicts:     {}", conflicts.len());
    println!(
        "Sync:          {} (every {} min{})",
        if policy.sync_enabled { "enabled" } else { "disabled" },
        policy.sync_interval_minutes,
        if policy.wifi_only { ", Wi-Fi only" } else { "" }
    );
    Ok(())
}

pub async fn run_sync_conflicts(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let conflicts = store.conflicted().await?;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(conflict_to_item)
            .collect::<Vec<ConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts.");
        return Ok(());
    }

    for line in format_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_sync_resolve(
    id: &str,
    resolution: Resolution,
    db_path: &Path,
) -> Result<(), CliError> {
    let normalized_id = normalize_entry_identifier(id)?;
    let store = open_store(db_path).await?;
    let conflicts = store.conflicted().await?;
    let entry_id = find_conflicted(&normalized_id, &conflicts)?;

    store.resolve_conflict(&entry_id, resolution).await?;
    println!("{entry_id}");
    Ok(())
}

/// Match a full id or unique prefix among conflicted entries, tombstones included.
pub fn find_conflicted(query: &str, conflicts: &[ConflictRecord]) -> Result<EntryId, CliError> {
    let matches = conflicts
        .iter()
        .map(|conflict| &conflict.primary.id)
        .filter(|id| id.to_string().starts_with(query))
        .collect::<Vec<_>>();

    match matches.as_slice() {
        [] => Err(CliError::NotConflicted(query.to_string())),
        [only] => Ok(**only),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|id| short_id(&id.to_string()))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousEntryId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub async fn run_sync_watch(db_path: &Path, config_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let config = load_remote_config(config_path)?;
    let coordinator = build_coordinator(&store, &config)?;
    let mut progress = coordinator.subscribe();

    // A terminal has no Wi-Fi signal; treat the link as unrestricted
    let (_network_tx, network_rx) = watch::channel(NetworkState {
        connected: true,
        on_wifi: true,
    });
    let scheduler = SyncScheduler::spawn(coordinator, store, network_rx, config.backoff());
    println!("Watching for changes. Press Ctrl-C to stop.");

    let mut last_phase = SyncPhase::Idle;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            changed = progress.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *progress.borrow_and_update();
                if current.phase != last_phase {
                    println!("sync: {}", current.phase);
                    last_phase = current.phase;
                }
            }
        }
    }

    tracing::info!("Stopping sync scheduler");
    scheduler.shutdown().await;
    Ok(())
}

pub fn format_report(report: &SyncReport) -> String {
    if !report.changed_anything() {
        return "Already up to date.".to_string();
    }
    format!(
        "Sync completed: pushed {}, applied {}, deleted {}, conflicts {}",
        report.pushed, report.applied, report.deleted_remotely, report.conflicts
    )
}

fn print_conflict_hint(report: &SyncReport) {
    if report.conflicts > 0 {
        println!("Run `journal sync conflicts` to review entries changed on both sides.");
    }
}

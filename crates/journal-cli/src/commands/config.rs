use std::path::Path;

use journal_core::config::RemoteConfig;
use journal_core::models::{SyncPolicy, MIN_SYNC_INTERVAL_MINUTES};

use crate::cli::ConfigCommands;
use crate::commands::common::open_store;
use crate::error::CliError;

pub async fn run_config(
    command: ConfigCommands,
    db_path: &Path,
    config_path: &Path,
) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => run_config_show(db_path, config_path).await,
        ConfigCommands::Set {
            enabled,
            interval_minutes,
            wifi_only,
        } => run_config_set(enabled, interval_minutes, wifi_only, db_path).await,
    }
}

pub async fn run_config_show(db_path: &Path, config_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let policy = store.load_policy().await?;
    let remote = RemoteConfig::load(config_path)?;

    println!("sync_enabled           {}", policy.sync_enabled);
    println!("sync_interval_minutes  {}", policy.sync_interval_minutes);
    println!("wifi_only              {}", policy.wifi_only);
    println!("config_file            {}", config_path.display());
    println!(
        "remote_url             {}",
        remote.base_url.as_deref().unwrap_or("(not set)")
    );
    println!(
        "auth_token             {}",
        if remote.auth_token.is_some() { "set" } else { "(not set)" }
    );
    println!("request_timeout_secs   {}", remote.request_timeout_secs);
    println!("pass_timeout_secs      {}", remote.pass_timeout_secs);
    Ok(())
}

pub async fn run_config_set(
    enabled: Option<bool>,
    interval_minutes: Option<u32>,
    wifi_only: Option<bool>,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let current = store.load_policy().await?;
    let policy = apply_policy_changes(current, enabled, interval_minutes, wifi_only)?;

    if policy != current {
        store.save_policy(&policy).await?;
    }
    println!(
        "sync_enabled={} sync_interval_minutes={} wifi_only={}",
        policy.sync_enabled, policy.sync_interval_minutes, policy.wifi_only
    );
    Ok(())
}

pub fn apply_policy_changes(
    current: SyncPolicy,
    enabled: Option<bool>,
    interval_minutes: Option<u32>,
    wifi_only: Option<bool>,
) -> Result<SyncPolicy, CliError> {
    if let Some(minutes) = interval_minutes {
        if minutes < MIN_SYNC_INTERVAL_MINUTES {
            return Err(CliError::Core(journal_core::Error::InvalidInput(format!(
                "sync interval must be at least {MIN_SYNC_INTERVAL_MINUTES} minute(s)"
            ))));
        }
    }

    Ok(SyncPolicy {
        sync_enabled: enabled.unwrap_or(current.sync_enabled),
        sync_interval_minutes: interval_minutes.unwrap_or(current.sync_interval_minutes),
        wifi_only: wifi_only.unwrap_or(current.wifi_only),
    })
}

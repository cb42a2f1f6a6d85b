use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use journal_core::config::RemoteConfig;
use journal_core::models::{ConflictRecord, Entry, EntryId};
use journal_core::services::LocalStore;
use journal_core::sync::{HttpRemoteClient, SyncCoordinator};
use serde::Serialize;

use crate::error::CliError;

const DB_PATH_ENV: &str = "JOURNAL_DB_PATH";
const CONFIG_PATH_ENV: &str = "JOURNAL_CONFIG";
const SHORT_ID_LEN: usize = 13;

#[derive(Debug, Serialize)]
pub struct EntryListItem {
    pub id: String,
    pub preview: String,
    pub text: String,
    pub entry_date: i64,
    pub updated_at: i64,
    pub relative_time: String,
    pub location: Option<String>,
    pub images: Vec<String>,
    pub is_marked: bool,
}

#[derive(Debug, Serialize)]
pub struct ConflictItem {
    pub id: String,
    pub local_preview: String,
    pub local_updated_at: i64,
    pub local_deleted: bool,
    pub remote_preview: Option<String>,
    pub remote_updated_at: Option<i64>,
    pub remote_deleted: Option<bool>,
    pub status: String,
}

pub async fn open_store(path: &Path) -> Result<LocalStore, CliError> {
    tracing::debug!("Opening local store at {}", path.display());
    Ok(LocalStore::open_path(path).await?)
}

/// Load the remote config, failing when the remote cannot be reached at all.
pub fn load_remote_config(config_path: &Path) -> Result<RemoteConfig, CliError> {
    let config = RemoteConfig::load(config_path)?;
    if config.base_url.is_none() || config.auth_token.is_none() {
        return Err(CliError::SyncNotConfigured);
    }
    config.validate()?;
    Ok(config)
}

pub fn build_coordinator(
    store: &LocalStore,
    config: &RemoteConfig,
) -> Result<Arc<SyncCoordinator>, CliError> {
    let remote = HttpRemoteClient::new(config)?;
    Ok(Arc::new(SyncCoordinator::new(
        store.clone(),
        Arc::new(remote),
        config.timeouts(),
    )))
}

pub async fn resolve_entry(entry_query: &str, store: &LocalStore) -> Result<Entry, CliError> {
    if let Ok(entry_id) = entry_query.parse::<EntryId>() {
        if let Some(entry) = store.get_entry(&entry_id).await? {
            return Ok(entry);
        }
    }

    let matching_ids = store.list_entry_ids_by_prefix(entry_query, 3).await?;

    match matching_ids.as_slice() {
        [] => Err(CliError::EntryNotFound(entry_query.to_string())),
        [only] => {
            let resolved_id = only
                .parse::<EntryId>()
                .map_err(|_| CliError::EntryNotFound(entry_query.to_string()))?;
            store
                .get_entry(&resolved_id)
                .await?
                .ok_or_else(|| CliError::EntryNotFound(entry_query.to_string()))
        }
        _ => {
            let options = matching_ids
                .iter()
                .map(|id| short_id(id))
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousEntryId(format!(
                "ID prefix '{entry_query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn format_entry_lines(entries: &[Entry]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    entries
        .iter()
        .map(|entry| {
            let id = short_id(&entry.id.to_string());
            let marker = if entry.is_marked { "*" } else { " " };
            let preview = entry_preview(&entry.text, 40);
            let relative_time = format_relative_time(entry.updated_at, now_ms);

            match &entry.location {
                Some(location) => {
                    format!("{id:<13} {marker} {preview:<40}  {relative_time:<10}  @{location}")
                }
                None => format!("{id:<13} {marker} {preview:<40}  {relative_time}"),
            }
        })
        .collect()
}

pub fn entry_to_list_item(entry: &Entry) -> EntryListItem {
    let now_ms = Utc::now().timestamp_millis();
    EntryListItem {
        id: entry.id.to_string(),
        preview: entry_preview(&entry.text, 80),
        text: entry.text.clone(),
        entry_date: entry.entry_date,
        updated_at: entry.updated_at,
        relative_time: format_relative_time(entry.updated_at, now_ms),
        location: entry.location.clone(),
        images: entry.images.clone(),
        is_marked: entry.is_marked,
    }
}

pub fn conflict_to_item(conflict: &ConflictRecord) -> ConflictItem {
    let remote = conflict.pending_remote.as_ref();
    ConflictItem {
        id: conflict.primary.id.to_string(),
        local_preview: entry_preview(&conflict.primary.text, 80),
        local_updated_at: conflict.primary.updated_at,
        local_deleted: conflict.primary.is_deleted,
        remote_preview: remote.map(|entry| entry_preview(&entry.text, 80)),
        remote_updated_at: remote.map(|entry| entry.updated_at),
        remote_deleted: remote.map(|entry| entry.is_deleted),
        status: conflict.primary_state.status.to_string(),
    }
}

pub fn format_conflict_lines(conflicts: &[ConflictRecord]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            let local = describe_side(&conflict.primary);
            let remote = conflict
                .pending_remote
                .as_ref()
                .map_or_else(|| "(missing)".to_string(), describe_side);
            format!(
                "{}  local: {local}  remote: {remote}",
                short_id(&conflict.primary.id.to_string())
            )
        })
        .collect()
}

fn describe_side(entry: &Entry) -> String {
    let when = format_sync_timestamp(entry.updated_at);
    if entry.is_deleted {
        format!("deleted ({when})")
    } else {
        format!("\"{}\" ({when})", entry_preview(&entry.text, 30))
    }
}

pub fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_LEN).collect()
}

pub fn entry_preview(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    if timestamp_ms <= 0 {
        return "never".to_string();
    }
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

/// Entry text from the arguments, falling back to piped stdin.
pub fn resolve_entry_text(text_parts: &[String]) -> Result<String, CliError> {
    if let Some(text) = normalize_content(&text_parts.join(" ")) {
        return Ok(text);
    }

    if let Some(text) = read_piped_stdin()? {
        return Ok(text);
    }

    Err(CliError::EmptyContent)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_entry_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyEntryId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    match cli_db_path.or_else(|| env::var_os(DB_PATH_ENV).map(PathBuf::from)) {
        Some(path) => Ok(path),
        None => default_db_path(),
    }
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("journal").join("journal.db"))
        .ok_or(CliError::MissingDirectory("data"))
}

pub fn resolve_config_path(cli_config_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    match cli_config_path.or_else(|| env::var_os(CONFIG_PATH_ENV).map(PathBuf::from)) {
        Some(path) => Ok(path),
        None => default_config_path(),
    }
}

pub fn default_config_path() -> Result<PathBuf, CliError> {
    dirs::config_dir()
        .map(|dir| dir.join("journal").join("remote.json"))
        .ok_or(CliError::MissingDirectory("config"))
}

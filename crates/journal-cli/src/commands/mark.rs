use std::path::Path;

use crate::commands::common::{normalize_entry_identifier, open_store, resolve_entry};
use crate::error::CliError;

pub async fn run_mark(id: &str, is_marked: bool, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_entry_identifier(id)?;
    let store = open_store(db_path).await?;
    let mut entry = resolve_entry(&normalized_id, &store).await?;

    // Unchanged flag is not an edit
    if entry.is_marked != is_marked {
        entry.is_marked = is_marked;
        store.update_entry(&entry).await?;
    }

    println!("{}", entry.id);
    Ok(())
}

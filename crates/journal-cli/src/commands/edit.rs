use std::path::Path;

use crate::commands::common::{
    normalize_entry_identifier, open_store, resolve_entry, resolve_entry_text,
};
use crate::error::CliError;

pub async fn run_edit(id: &str, text_parts: &[String], db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_entry_identifier(id)?;
    let text = resolve_entry_text(text_parts)?;

    let store = open_store(db_path).await?;
    let mut entry = resolve_entry(&normalized_id, &store).await?;
    if entry.text == text {
        println!("{}", entry.id);
        return Ok(());
    }

    entry.text = text;
    let updated = store.update_entry(&entry).await?;
    println!("{}", updated.id);
    Ok(())
}

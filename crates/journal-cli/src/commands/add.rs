use std::path::Path;

use journal_core::models::EntryDraft;
use journal_core::util::normalize_text_option;

use crate::commands::common::{open_store, resolve_entry_text};
use crate::error::CliError;

pub async fn run_add(
    text_parts: &[String],
    location: Option<String>,
    images: Vec<String>,
    is_marked: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let text = resolve_entry_text(text_parts)?;
    let draft = EntryDraft {
        location: normalize_text_option(location),
        images: images
            .into_iter()
            .filter_map(|image| normalize_text_option(Some(image)))
            .collect(),
        is_marked,
        ..EntryDraft::new(text)
    };

    let store = open_store(db_path).await?;
    let entry = store.create_entry(draft).await?;

    println!("{}", entry.id);
    Ok(())
}

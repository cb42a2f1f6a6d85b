//! Database layer for Journal

mod connection;
mod migrations;
mod repository;
mod settings_repository;

pub use connection::Database;
pub use repository::{ApplyOutcome, EntryRepository, PushAck, SqliteEntryRepository, WriteOrigin};
pub use settings_repository::{SettingsRepository, SqliteSettingsRepository};

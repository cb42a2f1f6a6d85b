//! journal-core - Core library for Journal
//!
//! This crate contains the models, the SQLite local store and the offline-first
//! sync engine used by Journal clients.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Entry, EntryId};

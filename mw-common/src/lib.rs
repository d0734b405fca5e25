//! # MagicWord Common Library
//!
//! Shared code for the MagicWord crates:
//! - Vocabulary data model (entries, libraries, test history)
//! - Storage collaborator trait and its SQLite implementation
//! - Event types (MwEvent enum) and the broadcast EventBus
//! - Configuration loading
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod storage;
pub mod time;

pub use error::{Error, Result};
pub use models::{normalize_term, Entry, Library, WordForm};
pub use storage::{EntryStore, SqliteEntryStore};

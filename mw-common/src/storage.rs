//! Storage collaborator
//!
//! The scheduler, due-set selector and import dispatcher talk to storage only
//! through [`EntryStore`]. [`SqliteEntryStore`] is the production backing;
//! tests substitute in-memory pools or their own implementations.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::db::{entries, libraries};
use crate::models::{Entry, Library};
use crate::Result;

#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Entry whose normalized term matches `term` inside `library_id`
    async fn get_entry(&self, term: &str, library_id: i64) -> Result<Option<Entry>>;

    /// Insert or replace by identity key, returning the row id
    async fn insert_or_replace_entry(&self, entry: &Entry) -> Result<i64>;

    /// Overwrite an existing entry by row id
    async fn update_entry(&self, entry: &Entry) -> Result<()>;

    /// Entries of the given libraries due at or before `now`,
    /// ordered by next review time then term
    async fn entries_due_for_libraries(&self, library_ids: &[i64], now: i64) -> Result<Vec<Entry>>;

    /// Every entry of one library in display order
    async fn entries_in_library(&self, library_id: i64) -> Result<Vec<Entry>>;

    async fn create_library(&self, name: &str, description: &str) -> Result<i64>;

    async fn list_libraries(&self) -> Result<Vec<Library>>;

    /// Delete a library together with its entries
    async fn delete_library(&self, library_id: i64) -> Result<()>;
}

/// [`EntryStore`] over a SQLite pool
#[derive(Clone)]
pub struct SqliteEntryStore {
    pool: SqlitePool,
}

impl SqliteEntryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl EntryStore for SqliteEntryStore {
    async fn get_entry(&self, term: &str, library_id: i64) -> Result<Option<Entry>> {
        entries::get_entry(&self.pool, term, library_id).await
    }

    async fn insert_or_replace_entry(&self, entry: &Entry) -> Result<i64> {
        entries::insert_or_replace_entry(&self.pool, entry).await
    }

    async fn update_entry(&self, entry: &Entry) -> Result<()> {
        entries::update_entry(&self.pool, entry).await
    }

    async fn entries_due_for_libraries(&self, library_ids: &[i64], now: i64) -> Result<Vec<Entry>> {
        entries::entries_due_for_libraries(&self.pool, library_ids, now).await
    }

    async fn entries_in_library(&self, library_id: i64) -> Result<Vec<Entry>> {
        entries::entries_in_library(&self.pool, library_id).await
    }

    async fn create_library(&self, name: &str, description: &str) -> Result<i64> {
        libraries::create_library(&self.pool, name, description).await
    }

    async fn list_libraries(&self) -> Result<Vec<Library>> {
        libraries::list_libraries(&self.pool).await
    }

    async fn delete_library(&self, library_id: i64) -> Result<()> {
        libraries::delete_library(&self.pool, library_id).await
    }
}

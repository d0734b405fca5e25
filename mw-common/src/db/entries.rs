//! Entry persistence
//!
//! Entries are unique per `(library_id, term_key)` where `term_key` is the
//! normalized term. Writes go through [`retry_on_lock`] because the import
//! dispatcher persists from several tasks at once.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
use crate::models::{normalize_term, Entry, WordForm};
use crate::{Error, Result};

const ENTRY_COLUMNS: &str = r#"
    id, library_id, term, phonetic, definition, definition_en, example, mnemonic,
    forms, sort_order, easiness_factor, interval, repetitions, next_review_time,
    last_review_time, review_count, correct_count, incorrect_count
"#;

fn row_to_entry(row: &SqliteRow) -> Result<Entry> {
    let forms: String = row.try_get("forms")?;
    let forms: Vec<WordForm> = serde_json::from_str(&forms)?;

    Ok(Entry {
        id: row.try_get("id")?,
        library_id: row.try_get("library_id")?,
        term: row.try_get("term")?,
        phonetic: row.try_get("phonetic")?,
        definition: row.try_get("definition")?,
        definition_en: row.try_get("definition_en")?,
        example: row.try_get("example")?,
        mnemonic: row.try_get("mnemonic")?,
        forms,
        sort_order: row.try_get("sort_order")?,
        easiness_factor: row.try_get("easiness_factor")?,
        interval: row.try_get("interval")?,
        repetitions: row.try_get("repetitions")?,
        next_review_time: row.try_get("next_review_time")?,
        last_review_time: row.try_get("last_review_time")?,
        review_count: row.try_get("review_count")?,
        correct_count: row.try_get("correct_count")?,
        incorrect_count: row.try_get("incorrect_count")?,
    })
}

fn rows_to_entries(rows: &[SqliteRow]) -> Result<Vec<Entry>> {
    rows.iter().map(row_to_entry).collect()
}

/// Look up an entry by term (case/whitespace-insensitive) within a library
pub async fn get_entry(pool: &SqlitePool, term: &str, library_id: i64) -> Result<Option<Entry>> {
    let query = format!(
        "SELECT {} FROM entries WHERE library_id = ? AND term_key = ?",
        ENTRY_COLUMNS
    );
    let row = sqlx::query(&query)
        .bind(library_id)
        .bind(normalize_term(term))
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_entry).transpose()
}

/// Look up an entry by row id
pub async fn get_entry_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Entry>> {
    let query = format!("SELECT {} FROM entries WHERE id = ?", ENTRY_COLUMNS);
    let row = sqlx::query(&query).bind(id).fetch_optional(pool).await?;

    row.as_ref().map(row_to_entry).transpose()
}

/// Insert an entry, replacing any existing entry with the same identity key
///
/// Returns the row id of the stored entry.
pub async fn insert_or_replace_entry(pool: &SqlitePool, entry: &Entry) -> Result<i64> {
    if entry.term.trim().is_empty() {
        return Err(Error::InvalidInput("entry term is empty".to_string()));
    }
    let forms = serde_json::to_string(&entry.forms)?;
    let term_key = entry.key();

    retry_on_lock("insert_or_replace_entry", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO entries (
                library_id, term, term_key, phonetic, definition, definition_en, example,
                mnemonic, forms, sort_order, easiness_factor, interval, repetitions,
                next_review_time, last_review_time, review_count, correct_count, incorrect_count
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(library_id, term_key) DO UPDATE SET
                term = excluded.term,
                phonetic = excluded.phonetic,
                definition = excluded.definition,
                definition_en = excluded.definition_en,
                example = excluded.example,
                mnemonic = excluded.mnemonic,
                forms = excluded.forms,
                sort_order = excluded.sort_order,
                easiness_factor = excluded.easiness_factor,
                interval = excluded.interval,
                repetitions = excluded.repetitions,
                next_review_time = excluded.next_review_time,
                last_review_time = excluded.last_review_time,
                review_count = excluded.review_count,
                correct_count = excluded.correct_count,
                incorrect_count = excluded.incorrect_count
            RETURNING id
            "#,
        )
        .bind(entry.library_id)
        .bind(&entry.term)
        .bind(&term_key)
        .bind(&entry.phonetic)
        .bind(&entry.definition)
        .bind(&entry.definition_en)
        .bind(&entry.example)
        .bind(&entry.mnemonic)
        .bind(&forms)
        .bind(entry.sort_order)
        .bind(entry.easiness_factor)
        .bind(entry.interval)
        .bind(entry.repetitions)
        .bind(entry.next_review_time)
        .bind(entry.last_review_time)
        .bind(entry.review_count)
        .bind(entry.correct_count)
        .bind(entry.incorrect_count)
        .fetch_one(pool)
        .await?;

        Ok::<i64, Error>(id)
    })
    .await
}

/// Update an existing entry by row id
pub async fn update_entry(pool: &SqlitePool, entry: &Entry) -> Result<()> {
    let forms = serde_json::to_string(&entry.forms)?;
    let term_key = entry.key();

    let rows_affected = retry_on_lock("update_entry", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query(
            r#"
            UPDATE entries SET
                library_id = ?, term = ?, term_key = ?, phonetic = ?, definition = ?,
                definition_en = ?, example = ?, mnemonic = ?, forms = ?, sort_order = ?,
                easiness_factor = ?, interval = ?, repetitions = ?, next_review_time = ?,
                last_review_time = ?, review_count = ?, correct_count = ?, incorrect_count = ?
            WHERE id = ?
            "#,
        )
        .bind(entry.library_id)
        .bind(&entry.term)
        .bind(&term_key)
        .bind(&entry.phonetic)
        .bind(&entry.definition)
        .bind(&entry.definition_en)
        .bind(&entry.example)
        .bind(&entry.mnemonic)
        .bind(&forms)
        .bind(entry.sort_order)
        .bind(entry.easiness_factor)
        .bind(entry.interval)
        .bind(entry.repetitions)
        .bind(entry.next_review_time)
        .bind(entry.last_review_time)
        .bind(entry.review_count)
        .bind(entry.correct_count)
        .bind(entry.incorrect_count)
        .bind(entry.id)
        .execute(pool)
        .await?;

        Ok::<u64, Error>(result.rows_affected())
    })
    .await?;

    if rows_affected == 0 {
        return Err(Error::NotFound(format!("entry id {}", entry.id)));
    }
    Ok(())
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Entries in any of `library_ids` whose next review time is at or before `now`
///
/// Ordered by next review time, then term.
pub async fn entries_due_for_libraries(
    pool: &SqlitePool,
    library_ids: &[i64],
    now: i64,
) -> Result<Vec<Entry>> {
    if library_ids.is_empty() {
        return Ok(Vec::new());
    }

    let query = format!(
        "SELECT {} FROM entries WHERE library_id IN ({}) AND next_review_time <= ? \
         ORDER BY next_review_time ASC, term ASC",
        ENTRY_COLUMNS,
        placeholders(library_ids.len())
    );

    let mut q = sqlx::query(&query);
    for id in library_ids {
        q = q.bind(*id);
    }
    let rows = q.bind(now).fetch_all(pool).await?;

    rows_to_entries(&rows)
}

/// All entries of one library in display order
pub async fn entries_in_library(pool: &SqlitePool, library_id: i64) -> Result<Vec<Entry>> {
    let query = format!(
        "SELECT {} FROM entries WHERE library_id = ? ORDER BY sort_order ASC, id ASC",
        ENTRY_COLUMNS
    );
    let rows = sqlx::query(&query).bind(library_id).fetch_all(pool).await?;

    rows_to_entries(&rows)
}

/// Number of entries in a library
pub async fn count_entries(pool: &SqlitePool, library_id: i64) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries WHERE library_id = ?")
        .bind(library_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

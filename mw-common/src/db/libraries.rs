//! Library persistence

use sqlx::{Row, SqlitePool};

use crate::models::Library;
use crate::{time, Error, Result};

/// Create a library, returning its id
pub async fn create_library(pool: &SqlitePool, name: &str, description: &str) -> Result<i64> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("library name is empty".to_string()));
    }

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO libraries (name, description, created_at) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(name)
    .bind(description)
    .bind(time::now_millis())
    .fetch_one(pool)
    .await?;

    tracing::info!(library_id = id, name, "Created library");
    Ok(id)
}

/// Load one library
pub async fn get_library(pool: &SqlitePool, id: i64) -> Result<Option<Library>> {
    let row = sqlx::query(
        "SELECT id, name, description, created_at, last_index FROM libraries WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(Library {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
            last_index: row.try_get("last_index")?,
        })),
        None => Ok(None),
    }
}

/// All libraries, oldest first
pub async fn list_libraries(pool: &SqlitePool) -> Result<Vec<Library>> {
    let rows = sqlx::query(
        "SELECT id, name, description, created_at, last_index FROM libraries ORDER BY id ASC",
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(Library {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                description: row.try_get("description")?,
                created_at: row.try_get("created_at")?,
                last_index: row.try_get("last_index")?,
            })
        })
        .collect()
}

/// Delete a library together with its entries, in one transaction
pub async fn delete_library(pool: &SqlitePool, id: i64) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM entries WHERE library_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM libraries WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("library id {}", id)));
    }

    tx.commit().await?;
    tracing::info!(library_id = id, "Deleted library");
    Ok(())
}

/// Remember the last viewed position in a library
pub async fn update_last_index(pool: &SqlitePool, id: i64, last_index: i64) -> Result<()> {
    sqlx::query("UPDATE libraries SET last_index = ? WHERE id = ?")
        .bind(last_index)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{entries, init_memory_pool};
    use crate::models::Entry;

    #[tokio::test]
    async fn test_create_and_list() {
        let pool = init_memory_pool().await.unwrap();
        let a = create_library(&pool, "CET-4", "College English").await.unwrap();
        let b = create_library(&pool, "IELTS", "").await.unwrap();

        let libraries = list_libraries(&pool).await.unwrap();
        assert_eq!(libraries.len(), 2);
        assert_eq!(libraries[0].id, a);
        assert_eq!(libraries[1].id, b);
        assert_eq!(libraries[0].description, "College English");
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let pool = init_memory_pool().await.unwrap();
        assert!(create_library(&pool, "  ", "").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_cascades_entries() {
        let pool = init_memory_pool().await.unwrap();
        let id = create_library(&pool, "Temp", "").await.unwrap();
        entries::insert_or_replace_entry(&pool, &Entry::new("apple", id)).await.unwrap();

        delete_library(&pool, id).await.unwrap();

        assert!(get_library(&pool, id).await.unwrap().is_none());
        assert_eq!(entries::count_entries(&pool, id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_last_index() {
        let pool = init_memory_pool().await.unwrap();
        let id = create_library(&pool, "Default", "").await.unwrap();
        update_last_index(&pool, id, 42).await.unwrap();
        assert_eq!(get_library(&pool, id).await.unwrap().unwrap().last_index, 42);
    }
}

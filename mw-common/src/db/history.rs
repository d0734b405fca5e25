//! Test history persistence

use sqlx::{Row, SqlitePool};

use crate::models::{TestHistory, TestType};
use crate::{Error, Result};

/// Record a finished test run, returning its id
pub async fn insert_history(pool: &SqlitePool, history: &TestHistory) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO test_history (timestamp, total_questions, correct_count, test_type, duration_seconds)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(history.timestamp)
    .bind(history.total_questions)
    .bind(history.correct_count)
    .bind(history.test_type.as_str())
    .bind(history.duration_seconds)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Most recent test runs first
pub async fn recent_history(pool: &SqlitePool, limit: i64) -> Result<Vec<TestHistory>> {
    let rows = sqlx::query(
        r#"
        SELECT id, timestamp, total_questions, correct_count, test_type, duration_seconds
        FROM test_history
        ORDER BY timestamp DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let test_type: String = row.try_get("test_type")?;
            let test_type = TestType::parse(&test_type)
                .ok_or_else(|| Error::Internal(format!("Unknown test type: {}", test_type)))?;

            Ok(TestHistory {
                id: row.try_get("id")?,
                timestamp: row.try_get("timestamp")?,
                total_questions: row.try_get("total_questions")?,
                correct_count: row.try_get("correct_count")?,
                test_type,
                duration_seconds: row.try_get("duration_seconds")?,
            })
        })
        .collect()
}

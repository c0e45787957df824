//! Prompt persistence

use pinscout_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{format_timestamp, parse_enum, parse_timestamp, parse_uuid};
use crate::models::{Prompt, PromptStatus};

pub async fn insert_prompt(pool: &SqlitePool, prompt: &Prompt) -> Result<()> {
    sqlx::query("INSERT INTO prompts (id, text, status, created_at) VALUES (?, ?, ?, ?)")
        .bind(prompt.id.to_string())
        .bind(&prompt.text)
        .bind(prompt.status.as_str())
        .bind(format_timestamp(&prompt.created_at))
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn load_prompt(pool: &SqlitePool, id: Uuid) -> Result<Option<Prompt>> {
    let row = sqlx::query("SELECT id, text, status, created_at FROM prompts WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(prompt_from_row).transpose()
}

/// Page of prompts, newest first
pub async fn list_prompts(pool: &SqlitePool, skip: i64, limit: i64) -> Result<Vec<Prompt>> {
    let rows = sqlx::query(
        r#"
        SELECT id, text, status, created_at FROM prompts
        ORDER BY created_at DESC, rowid DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(limit)
    .bind(skip)
    .fetch_all(pool)
    .await?;

    rows.iter().map(prompt_from_row).collect()
}

/// Set the prompt's status; false when the prompt does not exist
pub async fn update_prompt_status(
    pool: &SqlitePool,
    id: Uuid,
    status: PromptStatus,
) -> Result<bool> {
    let result = sqlx::query("UPDATE prompts SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete a prompt with its stage records, log entries and items
///
/// Returns false when the prompt does not exist (nothing is deleted).
pub async fn delete_prompt(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let deleted = sqlx::query("DELETE FROM prompts WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if deleted == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    super::stages::delete_stage_records(&mut tx, id).await?;
    super::items::delete_items(&mut tx, id).await?;

    tx.commit().await?;
    Ok(true)
}

/// Mark prompts left Processing by a previous process as Error
pub async fn fail_processing_prompts(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("UPDATE prompts SET status = ? WHERE status = ?")
        .bind(PromptStatus::Error.as_str())
        .bind(PromptStatus::Processing.as_str())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

fn prompt_from_row(row: &SqliteRow) -> Result<Prompt> {
    Ok(Prompt {
        id: parse_uuid(row.get("id"))?,
        text: row.get("text"),
        status: parse_enum(row.get("status"))?,
        created_at: parse_timestamp(row.get("created_at"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_insert_and_load() {
        let pool = init_memory_pool().await.unwrap();
        let prompt = Prompt::new("cozy reading nook").unwrap();
        insert_prompt(&pool, &prompt).await.unwrap();

        let loaded = load_prompt(&pool, prompt.id).await.unwrap().unwrap();
        assert_eq!(loaded.text, "cozy reading nook");
        assert_eq!(loaded.status, PromptStatus::Pending);
        assert!(load_prompt(&pool, Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_paged() {
        let pool = init_memory_pool().await.unwrap();
        let base = Utc::now();
        for i in 0..3 {
            let mut prompt = Prompt::new(&format!("prompt {}", i)).unwrap();
            prompt.created_at = base + Duration::seconds(i);
            insert_prompt(&pool, &prompt).await.unwrap();
        }

        let all = list_prompts(&pool, 0, 10).await.unwrap();
        let texts: Vec<_> = all.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, ["prompt 2", "prompt 1", "prompt 0"]);

        let page = list_prompts(&pool, 1, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].text, "prompt 1");
    }

    #[tokio::test]
    async fn test_unknown_stored_status_is_rejected() {
        let pool = init_memory_pool().await.unwrap();
        let prompt = Prompt::new("lamp").unwrap();
        insert_prompt(&pool, &prompt).await.unwrap();
        sqlx::query("UPDATE prompts SET status = 'paused'")
            .execute(&pool)
            .await
            .unwrap();

        assert!(load_prompt(&pool, prompt.id).await.is_err());
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_prompt() {
        let pool = init_memory_pool().await.unwrap();
        let missing = Uuid::new_v4();
        assert!(!update_prompt_status(&pool, missing, PromptStatus::Error).await.unwrap());
        assert!(!delete_prompt(&pool, missing).await.unwrap());
    }
}

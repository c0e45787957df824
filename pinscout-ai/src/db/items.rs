//! Item persistence

use pinscout_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use super::{parse_enum, parse_uuid};
use crate::models::{Item, ItemCounts, ItemStatus, Verdict};
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

const ITEM_COLUMNS: &str =
    "id, prompt_id, source_ref, image_ref, title, description, score, status, explanation, metadata";

/// Insert items in one transaction, preserving their order
pub async fn insert_items(pool: &SqlitePool, items: &[Item]) -> Result<()> {
    let mut tx = pool.begin().await?;

    for (position, item) in items.iter().enumerate() {
        let metadata = serde_json::to_string(&item.metadata)
            .map_err(|e| Error::Internal(format!("Failed to serialize item metadata: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO items (
                id, prompt_id, position, source_ref, image_ref, title,
                description, score, status, explanation, metadata
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(item.id.to_string())
        .bind(item.prompt_id.to_string())
        .bind(position as i64)
        .bind(&item.source_ref)
        .bind(&item.image_ref)
        .bind(&item.title)
        .bind(&item.description)
        .bind(item.score)
        .bind(item.status.as_str())
        .bind(&item.explanation)
        .bind(metadata)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// All items of a prompt in acquisition order
pub async fn list_items(pool: &SqlitePool, prompt_id: Uuid) -> Result<Vec<Item>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM items WHERE prompt_id = ? ORDER BY position ASC, rowid ASC",
        ITEM_COLUMNS
    ))
    .bind(prompt_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(item_from_row).collect()
}

/// Items of a prompt not yet classified
pub async fn list_pending_items(pool: &SqlitePool, prompt_id: Uuid) -> Result<Vec<Item>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM items WHERE prompt_id = ? AND status = ? ORDER BY position ASC, rowid ASC",
        ITEM_COLUMNS
    ))
    .bind(prompt_id.to_string())
    .bind(ItemStatus::Pending.as_str())
    .fetch_all(pool)
    .await?;

    rows.iter().map(item_from_row).collect()
}

/// Write score, status and explanation in one statement
///
/// Only a Pending item is updated; returns false when the item is missing
/// or already has a verdict.
pub async fn record_item_verdict(pool: &SqlitePool, id: Uuid, verdict: &Verdict) -> Result<bool> {
    let id = id.to_string();
    retry_on_lock("record item verdict", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query(
            "UPDATE items SET score = ?, status = ?, explanation = ? WHERE id = ? AND status = ?",
        )
        .bind(verdict.score)
        .bind(verdict.status.as_str())
        .bind(&verdict.explanation)
        .bind(&id)
        .bind(ItemStatus::Pending.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    })
    .await
}

pub async fn count_items_by_status(pool: &SqlitePool, prompt_id: Uuid) -> Result<ItemCounts> {
    let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM items WHERE prompt_id = ? GROUP BY status")
        .bind(prompt_id.to_string())
        .fetch_all(pool)
        .await?;

    let mut counts = ItemCounts::default();
    for row in &rows {
        let n = row.get::<i64, _>("n") as usize;
        match parse_enum::<ItemStatus>(row.get("status"))? {
            ItemStatus::Pending => counts.pending = n,
            ItemStatus::Approved => counts.approved = n,
            ItemStatus::Disqualified => counts.disqualified = n,
        }
    }
    Ok(counts)
}

/// Delete a prompt's items inside the caller's transaction
pub async fn delete_items(tx: &mut Transaction<'_, Sqlite>, prompt_id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM items WHERE prompt_id = ?")
        .bind(prompt_id.to_string())
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected())
}

fn item_from_row(row: &SqliteRow) -> Result<Item> {
    let metadata: &str = row.get("metadata");
    Ok(Item {
        id: parse_uuid(row.get("id"))?,
        prompt_id: parse_uuid(row.get("prompt_id"))?,
        source_ref: row.get("source_ref"),
        image_ref: row.get("image_ref"),
        title: row.get("title"),
        description: row.get("description"),
        score: row.get("score"),
        status: parse_enum(row.get("status"))?,
        explanation: row.get("explanation"),
        metadata: serde_json::from_str(metadata)
            .map_err(|e| Error::Internal(format!("Invalid stored item metadata: {}", e)))?,
    })
}

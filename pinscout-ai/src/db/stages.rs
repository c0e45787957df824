//! Stage record and progress log persistence

use chrono::{DateTime, Utc};
use pinscout_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use super::{format_timestamp, parse_enum, parse_timestamp, parse_uuid};
use crate::models::{LogEntry, Stage, StageRecord, StageStatus};
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

const RECORD_COLUMNS: &str = "id, prompt_id, run_id, stage, status, timestamp";

/// Insert a stage record; log entries on the record are not written
pub async fn insert_stage_record(pool: &SqlitePool, record: &StageRecord) -> Result<()> {
    sqlx::query(
        "INSERT INTO stage_records (id, prompt_id, run_id, stage, status, timestamp) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(record.id.to_string())
    .bind(record.prompt_id.to_string())
    .bind(record.run_id.to_string())
    .bind(record.stage.as_str())
    .bind(record.status.as_str())
    .bind(format_timestamp(&record.timestamp))
    .execute(pool)
    .await?;
    Ok(())
}

/// Load one stage record with its log
pub async fn load_stage_record(pool: &SqlitePool, id: Uuid) -> Result<Option<StageRecord>> {
    let row = sqlx::query(&format!("SELECT {} FROM stage_records WHERE id = ?", RECORD_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => {
            let mut record = record_from_row(&row)?;
            record.log = load_log(pool, record.id).await?;
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

/// Most recent record of `stage` for a prompt, with its log
pub async fn latest_stage_record(
    pool: &SqlitePool,
    prompt_id: Uuid,
    stage: Stage,
) -> Result<Option<StageRecord>> {
    let id: Option<String> = sqlx::query_scalar(
        r#"
        SELECT id FROM stage_records
        WHERE prompt_id = ? AND stage = ?
        ORDER BY timestamp DESC, rowid DESC
        LIMIT 1
        "#,
    )
    .bind(prompt_id.to_string())
    .bind(stage.as_str())
    .fetch_optional(pool)
    .await?;

    match id {
        Some(id) => load_stage_record(pool, parse_uuid(&id)?).await,
        None => Ok(None),
    }
}

/// All records for a prompt in creation order, each with its log
pub async fn list_stage_records(pool: &SqlitePool, prompt_id: Uuid) -> Result<Vec<StageRecord>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM stage_records WHERE prompt_id = ? ORDER BY timestamp ASC, rowid ASC",
        RECORD_COLUMNS
    ))
    .bind(prompt_id.to_string())
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut record = record_from_row(row)?;
        record.log = load_log(pool, record.id).await?;
        records.push(record);
    }
    Ok(records)
}

/// Count records for a prompt, optionally restricted to one stage
pub async fn count_stage_records(
    pool: &SqlitePool,
    prompt_id: Uuid,
    stage: Option<Stage>,
) -> Result<i64> {
    let count = match stage {
        Some(stage) => {
            sqlx::query_scalar("SELECT COUNT(*) FROM stage_records WHERE prompt_id = ? AND stage = ?")
                .bind(prompt_id.to_string())
                .bind(stage.as_str())
                .fetch_one(pool)
                .await?
        }
        None => {
            sqlx::query_scalar("SELECT COUNT(*) FROM stage_records WHERE prompt_id = ?")
                .bind(prompt_id.to_string())
                .fetch_one(pool)
                .await?
        }
    };
    Ok(count)
}

/// Write a record's terminal status; false when the record does not exist
///
/// Retries on lock contention since a lost terminal write would leave the
/// record Pending forever.
pub async fn finish_stage_record(pool: &SqlitePool, id: Uuid, status: StageStatus) -> Result<bool> {
    if !status.is_terminal() {
        return Err(Error::InvalidInput(format!(
            "Stage record {} cannot be finished as {}",
            id, status
        )));
    }

    let id = id.to_string();
    retry_on_lock("finish stage record", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query("UPDATE stage_records SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(&id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    })
    .await
}

/// Delete a prompt's stage records inside the caller's transaction
///
/// Log entries go with their records (ON DELETE CASCADE).
pub async fn delete_stage_records(
    tx: &mut Transaction<'_, Sqlite>,
    prompt_id: Uuid,
) -> Result<u64> {
    let result = sqlx::query("DELETE FROM stage_records WHERE prompt_id = ?")
        .bind(prompt_id.to_string())
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected())
}

/// Append a log entry; false when the stage record does not exist
pub async fn append_log_entry(
    pool: &SqlitePool,
    stage_record_id: Uuid,
    logged_at: DateTime<Utc>,
    message: &str,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO stage_log_entries (stage_record_id, logged_at, message)
        SELECT id, ?, ? FROM stage_records WHERE id = ?
        "#,
    )
    .bind(format_timestamp(&logged_at))
    .bind(message)
    .bind(stage_record_id.to_string())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Log entries for a record in append order
pub async fn load_log(pool: &SqlitePool, stage_record_id: Uuid) -> Result<Vec<LogEntry>> {
    let rows = sqlx::query(
        "SELECT logged_at, message FROM stage_log_entries WHERE stage_record_id = ? ORDER BY seq ASC",
    )
    .bind(stage_record_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(LogEntry {
                timestamp: parse_timestamp(row.get("logged_at"))?,
                message: row.get("message"),
            })
        })
        .collect()
}

/// Ids of records still Pending (left behind by an interrupted process)
pub async fn list_pending_stage_record_ids(pool: &SqlitePool) -> Result<Vec<Uuid>> {
    let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM stage_records WHERE status = ?")
        .bind(StageStatus::Pending.as_str())
        .fetch_all(pool)
        .await?;
    ids.iter().map(|id| parse_uuid(id)).collect()
}

fn record_from_row(row: &SqliteRow) -> Result<StageRecord> {
    Ok(StageRecord {
        id: parse_uuid(row.get("id"))?,
        prompt_id: parse_uuid(row.get("prompt_id"))?,
        run_id: parse_uuid(row.get("run_id"))?,
        stage: parse_enum(row.get("stage"))?,
        status: parse_enum(row.get("status"))?,
        timestamp: parse_timestamp(row.get("timestamp"))?,
        log: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;
    use chrono::Duration;

    #[tokio::test]
    async fn test_log_entries_keep_append_order() {
        let pool = init_memory_pool().await.unwrap();
        let record = StageRecord::pending(Uuid::new_v4(), Uuid::new_v4(), Stage::Warmup);
        insert_stage_record(&pool, &record).await.unwrap();

        for message in ["first", "second", "third"] {
            assert!(append_log_entry(&pool, record.id, Utc::now(), message).await.unwrap());
        }

        let loaded = load_stage_record(&pool, record.id).await.unwrap().unwrap();
        let messages: Vec<_> = loaded.log.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_append_to_missing_record_is_noop() {
        let pool = init_memory_pool().await.unwrap();
        let missing = Uuid::new_v4();
        assert!(!append_log_entry(&pool, missing, Utc::now(), "lost").await.unwrap());
        assert!(load_log(&pool, missing).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_latest_record_wins() {
        let pool = init_memory_pool().await.unwrap();
        let prompt_id = Uuid::new_v4();

        let mut older = StageRecord::pending(prompt_id, Uuid::new_v4(), Stage::Acquisition);
        older.timestamp = Utc::now() - Duration::minutes(5);
        insert_stage_record(&pool, &older).await.unwrap();
        finish_stage_record(&pool, older.id, StageStatus::Failed).await.unwrap();

        let newer = StageRecord::pending(prompt_id, Uuid::new_v4(), Stage::Acquisition);
        insert_stage_record(&pool, &newer).await.unwrap();
        finish_stage_record(&pool, newer.id, StageStatus::Completed).await.unwrap();

        let latest = latest_stage_record(&pool, prompt_id, Stage::Acquisition)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, newer.id);
        assert_eq!(latest.status, StageStatus::Completed);
        assert_eq!(count_stage_records(&pool, prompt_id, None).await.unwrap(), 2);
        assert!(latest_stage_record(&pool, prompt_id, Stage::Validation)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_finish_rejects_pending_status() {
        let pool = init_memory_pool().await.unwrap();
        let record = StageRecord::pending(Uuid::new_v4(), Uuid::new_v4(), Stage::Warmup);
        insert_stage_record(&pool, &record).await.unwrap();

        let result = finish_stage_record(&pool, record.id, StageStatus::Pending).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(finish_stage_record(&pool, record.id, StageStatus::Failed).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_cascades_to_log_entries() {
        let pool = init_memory_pool().await.unwrap();
        let record = StageRecord::pending(Uuid::new_v4(), Uuid::new_v4(), Stage::Validation);
        insert_stage_record(&pool, &record).await.unwrap();
        append_log_entry(&pool, record.id, Utc::now(), "Validated item 1/1 - approved")
            .await
            .unwrap();

        let mut tx = pool.begin().await.unwrap();
        assert_eq!(delete_stage_records(&mut tx, record.prompt_id).await.unwrap(), 1);
        tx.commit().await.unwrap();
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stage_log_entries")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }
}

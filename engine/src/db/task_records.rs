//! Task record persistence
//!
//! Task records are written once. Triggers in the schema reject updates and
//! deletes, and this repository exposes no mutation besides `insert`.

use crate::conductor::types::TaskRecord;
use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

/// Task record repository for database operations
pub struct TaskRecordRepository {
    pool: SqlitePool,
}

impl TaskRecordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, record: &TaskRecord) -> Result<()> {
        let steps = serde_json::to_string(&record.steps).context("Failed to encode steps")?;
        let results = serde_json::to_string(&record.results).context("Failed to encode results")?;
        let warnings =
            serde_json::to_string(&record.warnings).context("Failed to encode warnings")?;

        sqlx::query(
            "INSERT INTO task_records
                (id, conversation_id, request, status, steps, results, warnings, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.conversation_id)
        .bind(&record.request)
        .bind(record.status.as_str())
        .bind(steps)
        .bind(results)
        .bind(warnings)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert task record")?;

        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<TaskRecord>> {
        let row = sqlx::query(
            "SELECT id, conversation_id, request, status, steps, results, warnings, created_at
             FROM task_records WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch task record")?;

        row.as_ref().map(record_from_row).transpose()
    }

    /// Most recent records across all conversations, newest first
    pub async fn recent(&self, limit: i64) -> Result<Vec<TaskRecord>> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, request, status, steps, results, warnings, created_at
             FROM task_records
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch recent task records")?;

        rows.iter().map(record_from_row).collect()
    }

    pub async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM task_records")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count task records")
    }
}

fn record_from_row(row: &SqliteRow) -> Result<TaskRecord> {
    let status: String = row.get("status");
    let steps: String = row.get("steps");
    let results: String = row.get("results");
    let warnings: String = row.get("warnings");

    Ok(TaskRecord {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        request: row.get("request"),
        status: status.parse().map_err(anyhow::Error::msg)?,
        steps: serde_json::from_str(&steps).context("Corrupt steps column")?,
        results: serde_json::from_str(&results).context("Corrupt results column")?,
        warnings: serde_json::from_str(&warnings).context("Corrupt warnings column")?,
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conductor::types::{
        CapabilityRef, FailureReason, Plan, PlanStatus, Step, StepResult,
    };
    use crate::db::Database;
    use serde_json::{json, Map};
    use tempfile::TempDir;

    fn sample_record() -> TaskRecord {
        let scan = Step::new(
            "scan",
            CapabilityRef::new("system_control", "scan_directory"),
            json!({"path": "/tmp"}).as_object().cloned().unwrap(),
        );
        let organize = Step::new(
            "organize",
            CapabilityRef::new("system_control", "organize_by_type"),
            Map::new(),
        )
        .after(0);
        let plan = Plan::new(vec![scan.clone(), organize.clone()], vec!["w".into()]).unwrap();
        let results = vec![
            StepResult::failure(0, &scan, FailureReason::Timeout, "slow", 30_000),
            StepResult::skipped(1, &organize, FailureReason::DependencyNotSatisfied, "scan"),
        ];
        TaskRecord::new("conv", "organize /tmp", &plan, results)
    }

    #[tokio::test]
    async fn test_insert_and_get_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();
        let repo = db.task_records();

        let record = sample_record();
        repo.insert(&record).await.unwrap();

        let loaded = repo.get(&record.id).await.unwrap().unwrap();
        assert_eq!(loaded, record);
        assert_eq!(loaded.status, PlanStatus::Failed);
        assert_eq!(repo.recent(10).await.unwrap().len(), 1);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_records_are_append_only() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();
        let repo = db.task_records();

        let record = sample_record();
        repo.insert(&record).await.unwrap();

        let update = sqlx::query("UPDATE task_records SET status = 'success' WHERE id = ?")
            .bind(&record.id)
            .execute(db.pool())
            .await;
        assert!(update.is_err());

        let delete = sqlx::query("DELETE FROM task_records WHERE id = ?")
            .bind(&record.id)
            .execute(db.pool())
            .await;
        assert!(delete.is_err());

        assert_eq!(repo.count().await.unwrap(), 1);
        db.close().await.unwrap();
    }
}

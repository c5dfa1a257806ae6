use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::SecondsFormat;
use sqlx::{Row, SqlitePool};

use super::AuditStore;
use crate::domain::models::{ClinicAuditRecord, RecordId};

/// Snapshots in the `audit_records` table; the full record is kept as JSON
/// next to the columns used for lookup.
pub struct SqliteAuditStore {
    pool: SqlitePool,
}

impl SqliteAuditStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn decode(json: &str) -> Result<ClinicAuditRecord> {
        serde_json::from_str(json).context("Failed to decode stored audit record")
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn save(&self, record: &ClinicAuditRecord) -> Result<RecordId> {
        let json = serde_json::to_string(record).context("Failed to encode audit record")?;

        sqlx::query(
            "INSERT INTO audit_records (id, clinic_id, audit_type, score, created_at, record_json) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id.as_str())
        .bind(&record.clinic_id)
        .bind(record.audit_type.as_str())
        .bind(record.score.rounded())
        .bind(record.created_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .bind(json)
        .execute(&self.pool)
        .await
        .context("Failed to insert audit record")?;

        log::debug!("[STORE] Saved {} for {}", record.id, record.clinic_id);
        Ok(record.id.clone())
    }

    async fn find_latest(&self, clinic_id: &str) -> Result<Option<ClinicAuditRecord>> {
        let row = sqlx::query(
            "SELECT record_json FROM audit_records WHERE clinic_id = ? \
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
        )
        .bind(clinic_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load latest audit record")?;

        row.map(|r| Self::decode(&r.get::<String, _>("record_json")))
            .transpose()
    }

    async fn history(&self, clinic_id: &str, limit: usize) -> Result<Vec<ClinicAuditRecord>> {
        let rows = sqlx::query(
            "SELECT record_json FROM audit_records WHERE clinic_id = ? \
             ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(clinic_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load audit history")?;

        rows.iter()
            .map(|r| Self::decode(&r.get::<String, _>("record_json")))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_memory_pool;
    use crate::domain::models::{AuditType, Score};
    use crate::test_utils::fixtures::page_with_composite;
    use chrono::{Duration, Utc};

    fn record(clinic: &str, score: f64, age_minutes: i64) -> ClinicAuditRecord {
        ClinicAuditRecord {
            id: RecordId::generate(),
            clinic_id: clinic.to_string(),
            audit_type: AuditType::Comprehensive,
            score: Score::new(score),
            issues: vec![],
            recommendations: vec![],
            pages: vec![page_with_composite("https://a.test/", score)],
            requested_pages: 1,
            partial: false,
            created_at: Utc::now() - Duration::minutes(age_minutes),
        }
    }

    #[tokio::test]
    async fn round_trips_the_full_record() {
        let store = SqliteAuditStore::new(setup_memory_pool().await.unwrap());
        let saved = record("clinic-1", 87.5, 0);

        let id = store.save(&saved).await.unwrap();
        assert_eq!(id, saved.id);

        let loaded = store.find_latest("clinic-1").await.unwrap().unwrap();
        assert_eq!(loaded, saved);
    }

    #[tokio::test]
    async fn latest_and_history_are_newest_first() {
        let store = SqliteAuditStore::new(setup_memory_pool().await.unwrap());
        store.save(&record("clinic-1", 50.0, 30)).await.unwrap();
        store.save(&record("clinic-1", 70.0, 0)).await.unwrap();
        store.save(&record("clinic-1", 60.0, 10)).await.unwrap();
        store.save(&record("clinic-2", 99.0, 0)).await.unwrap();

        let latest = store.find_latest("clinic-1").await.unwrap().unwrap();
        assert_eq!(latest.score, Score::new(70.0));

        let history = store.history("clinic-1", 2).await.unwrap();
        let scores: Vec<f64> = history.iter().map(|r| r.score.value()).collect();
        assert_eq!(scores, vec![70.0, 60.0]);
    }

    #[tokio::test]
    async fn unknown_clinic_has_no_records() {
        let store = SqliteAuditStore::new(setup_memory_pool().await.unwrap());
        assert!(store.find_latest("nobody").await.unwrap().is_none());
        assert!(store.history("nobody", 10).await.unwrap().is_empty());
    }
}

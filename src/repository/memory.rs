use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;

use super::AuditStore;
use crate::domain::models::{ClinicAuditRecord, RecordId};

/// Process-local store keyed by clinic id.
#[derive(Default)]
pub struct MemoryAuditStore {
    records: DashMap<String, Vec<ClinicAuditRecord>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::with_capacity(10),
        }
    }

    /// Snapshots stored across all clinics.
    pub fn len(&self) -> usize {
        self.records.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn save(&self, record: &ClinicAuditRecord) -> Result<RecordId> {
        self.records
            .entry(record.clinic_id.clone())
            .or_default()
            .push(record.clone());
        log::debug!("[STORE] Saved {} for {} in memory", record.id, record.clinic_id);
        Ok(record.id.clone())
    }

    async fn find_latest(&self, clinic_id: &str) -> Result<Option<ClinicAuditRecord>> {
        Ok(self
            .records
            .get(clinic_id)
            .and_then(|records| records.last().cloned()))
    }

    async fn history(&self, clinic_id: &str, limit: usize) -> Result<Vec<ClinicAuditRecord>> {
        Ok(self
            .records
            .get(clinic_id)
            .map(|records| records.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

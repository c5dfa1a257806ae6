mod memory;
mod sqlite;

pub use memory::MemoryAuditStore;
pub use sqlite::SqliteAuditStore;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::models::{ClinicAuditRecord, RecordId};

/// Persistence for audit snapshots. Records are immutable; a clinic's history
/// is the sequence of saved snapshots, newest first.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn save(&self, record: &ClinicAuditRecord) -> Result<RecordId>;
    async fn find_latest(&self, clinic_id: &str) -> Result<Option<ClinicAuditRecord>>;
    async fn history(&self, clinic_id: &str, limit: usize) -> Result<Vec<ClinicAuditRecord>>;
}

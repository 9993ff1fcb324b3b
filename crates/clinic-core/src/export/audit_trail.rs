//! Audit trail export with chain verification.

use serde::{Deserialize, Serialize};

use super::escape_csv;
use crate::audit::ActivityLog;
use crate::db::{Database, DbResult};
use crate::models::ActivityEntry;

const FORMAT_VERSION: &str = "1.0";
const HASH_ALGORITHM: &str = "SHA-256";

/// Audit export metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditMetadata {
    /// Export format version
    pub format_version: String,
    /// Export timestamp
    pub exported_at: String,
    /// Hash algorithm used
    pub hash_algorithm: String,
    /// Hash of the newest entry at export time
    pub head_hash: Option<String>,
    pub entry_count: usize,
    /// Whether every link verified
    pub intact: bool,
    /// Sequence of the first entry that failed verification
    pub first_broken: Option<i64>,
}

/// Full activity log for an external auditor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditExport {
    pub metadata: AuditMetadata,
    pub entries: Vec<ActivityEntry>,
}

impl AuditExport {
    /// Read the whole log and verify it.
    pub fn build(db: &Database) -> DbResult<Self> {
        let verification = ActivityLog::new(db).verify()?;
        let entries = db.list_all_activity()?;

        Ok(Self {
            metadata: AuditMetadata {
                format_version: FORMAT_VERSION.to_string(),
                exported_at: chrono::Utc::now().to_rfc3339(),
                hash_algorithm: HASH_ALGORITHM.to_string(),
                head_hash: entries.last().map(|e| e.hash.clone()),
                entry_count: entries.len(),
                intact: verification.is_intact(),
                first_broken: verification.first_broken,
            },
            entries,
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_csv(&self) -> String {
        let mut csv = String::new();
        csv.push_str("sequence,created_at,actor,action,entity,entity_id,description,prev_hash,hash\n");

        for e in &self.entries {
            csv.push_str(&format!(
                "{},{},{},{},{},{},{},{},{}\n",
                e.sequence,
                escape_csv(&e.created_at),
                escape_csv(&e.actor),
                e.action.as_str(),
                escape_csv(&e.entity),
                escape_csv(&e.entity_id),
                escape_csv(&e.description),
                e.prev_hash,
                e.hash,
            ));
        }

        csv
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActivityAction;

    #[test]
    fn test_audit_export_of_intact_log() {
        let db = Database::open_in_memory().unwrap();
        let log = ActivityLog::new(&db);
        log.append("staff", ActivityAction::Create, "booking", "b1", "Booking requested")
            .unwrap();
        let last = log
            .append("staff", ActivityAction::Accept, "booking", "b1", "Accepted, with notes")
            .unwrap();

        let export = AuditExport::build(&db).unwrap();
        assert!(export.metadata.intact);
        assert_eq!(export.metadata.entry_count, 2);
        assert_eq!(export.metadata.head_hash, Some(last.hash));

        let csv = export.to_csv();
        assert_eq!(csv.lines().count(), 3);
        assert!(csv.contains("\"Accepted, with notes\""));
        assert!(export.to_json().unwrap().contains("SHA-256"));
    }

    #[test]
    fn test_empty_log() {
        let db = Database::open_in_memory().unwrap();
        let export = AuditExport::build(&db).unwrap();
        assert!(export.metadata.intact);
        assert_eq!(export.metadata.head_hash, None);
    }
}

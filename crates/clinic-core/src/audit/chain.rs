//! Hash-chained activity log.

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::db::{Database, DbResult};
use crate::models::{ActivityAction, ActivityEntry};

/// `prev_hash` of the first entry.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Fields covered by an entry's hash, in a fixed order.
#[derive(Serialize)]
struct CanonicalEntry<'e> {
    actor: &'e str,
    action: &'e str,
    entity: &'e str,
    entity_id: &'e str,
    description: &'e str,
    created_at: &'e str,
}

impl<'e> From<&'e ActivityEntry> for CanonicalEntry<'e> {
    fn from(entry: &'e ActivityEntry) -> Self {
        Self {
            actor: &entry.actor,
            action: entry.action.as_str(),
            entity: &entry.entity,
            entity_id: &entry.entity_id,
            description: &entry.description,
            created_at: &entry.created_at,
        }
    }
}

/// Outcome of walking the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerification {
    pub entries_checked: usize,
    /// Sequence number of the first entry whose link or hash is wrong
    pub first_broken: Option<i64>,
}

impl ChainVerification {
    pub fn is_intact(&self) -> bool {
        self.first_broken.is_none()
    }
}

/// Compute SHA-256 hash of data.
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hash of an entry given its predecessor's hash.
pub fn entry_hash(prev_hash: &str, entry: &ActivityEntry) -> DbResult<String> {
    let canonical = serde_json::to_string(&CanonicalEntry::from(entry))?;
    let mut data = String::with_capacity(prev_hash.len() + canonical.len());
    data.push_str(prev_hash);
    data.push_str(&canonical);
    Ok(hash_data(data.as_bytes()))
}

/// Activity log manager.
pub struct ActivityLog<'a> {
    db: &'a Database,
}

impl<'a> ActivityLog<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Append an entry linked to the current head.
    ///
    /// Call inside the same write transaction as the change it records so
    /// the two commit or roll back together.
    pub fn append(
        &self,
        actor: &str,
        action: ActivityAction,
        entity: &str,
        entity_id: &str,
        description: impl Into<String>,
    ) -> DbResult<ActivityEntry> {
        let prev_hash = self
            .db
            .last_activity_hash()?
            .unwrap_or_else(|| GENESIS_HASH.to_string());

        let mut entry = ActivityEntry {
            sequence: 0,
            actor: actor.to_string(),
            action,
            entity: entity.to_string(),
            entity_id: entity_id.to_string(),
            description: description.into(),
            prev_hash,
            hash: String::new(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        entry.hash = entry_hash(&entry.prev_hash, &entry)?;
        entry.sequence = self.db.insert_activity(&entry)?;

        debug!(sequence = entry.sequence, action = entry.action.as_str(), entity = %entry.entity, "activity appended");
        Ok(entry)
    }

    /// Walk the whole log and report the first broken link.
    pub fn verify(&self) -> DbResult<ChainVerification> {
        let entries = self.db.list_all_activity()?;
        let mut expected_prev = GENESIS_HASH.to_string();

        for entry in &entries {
            let recomputed = entry_hash(&entry.prev_hash, entry)?;
            if entry.prev_hash != expected_prev || entry.hash != recomputed {
                warn!(sequence = entry.sequence, "activity chain broken");
                return Ok(ChainVerification {
                    entries_checked: entries.len(),
                    first_broken: Some(entry.sequence),
                });
            }
            expected_prev = entry.hash.clone();
        }

        Ok(ChainVerification {
            entries_checked: entries.len(),
            first_broken: None,
        })
    }

    pub fn recent(&self, limit: usize) -> DbResult<Vec<ActivityEntry>> {
        self.db.list_recent_activity(limit)
    }

    pub fn history(&self, entity: &str, entity_id: &str) -> DbResult<Vec<ActivityEntry>> {
        self.db.list_activity_for(entity, entity_id)
    }
}

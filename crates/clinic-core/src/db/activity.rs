//! Activity log database operations (append-only).

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{ActivityAction, ActivityEntry};

impl Database {
    /// Append an entry. Returns its assigned sequence number.
    pub fn insert_activity(&self, entry: &ActivityEntry) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO activity_log (
                actor, action, entity, entity_id, description, prev_hash, hash, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                entry.actor,
                entry.action.as_str(),
                entry.entity,
                entry.entity_id,
                entry.description,
                entry.prev_hash,
                entry.hash,
                entry.created_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Hash of the most recent entry, if any.
    pub fn last_activity_hash(&self) -> DbResult<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT hash FROM activity_log ORDER BY sequence DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// All entries in append order.
    pub fn list_all_activity(&self) -> DbResult<Vec<ActivityEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT sequence, actor, action, entity, entity_id, description, prev_hash, hash, created_at
            FROM activity_log
            ORDER BY sequence
            "#,
        )?;
        let rows = stmt.query_map([], map_activity_row)?;
        collect_entries(rows)
    }

    /// Most recent entries, newest first.
    pub fn list_recent_activity(&self, limit: usize) -> DbResult<Vec<ActivityEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT sequence, actor, action, entity, entity_id, description, prev_hash, hash, created_at
            FROM activity_log
            ORDER BY sequence DESC
            LIMIT ?
            "#,
        )?;
        let rows = stmt.query_map([limit as i64], map_activity_row)?;
        collect_entries(rows)
    }

    /// History of one entity in append order.
    pub fn list_activity_for(&self, entity: &str, entity_id: &str) -> DbResult<Vec<ActivityEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT sequence, actor, action, entity, entity_id, description, prev_hash, hash, created_at
            FROM activity_log
            WHERE entity = ?1 AND entity_id = ?2
            ORDER BY sequence
            "#,
        )?;
        let rows = stmt.query_map(params![entity, entity_id], map_activity_row)?;
        collect_entries(rows)
    }
}

fn map_activity_row(row: &Row<'_>) -> rusqlite::Result<(ActivityEntry, String)> {
    Ok((
        ActivityEntry {
            sequence: row.get(0)?,
            actor: row.get(1)?,
            action: ActivityAction::Update,
            entity: row.get(3)?,
            entity_id: row.get(4)?,
            description: row.get(5)?,
            prev_hash: row.get(6)?,
            hash: row.get(7)?,
            created_at: row.get(8)?,
        },
        row.get(2)?,
    ))
}

fn collect_entries<I>(rows: I) -> DbResult<Vec<ActivityEntry>>
where
    I: Iterator<Item = rusqlite::Result<(ActivityEntry, String)>>,
{
    let mut entries = Vec::new();
    for row in rows {
        let (mut entry, action) = row?;
        entry.action = ActivityAction::parse(&action)
            .ok_or_else(|| DbError::Constraint(format!("Unknown activity action: {}", action)))?;
        entries.push(entry);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(hash: &str, prev_hash: &str) -> ActivityEntry {
        ActivityEntry {
            sequence: 0,
            actor: "admin".into(),
            action: ActivityAction::Create,
            entity: "service".into(),
            entity_id: "svc-1".into(),
            description: "Created service".into(),
            prev_hash: prev_hash.into(),
            hash: hash.into(),
            created_at: "2030-01-02T09:00:00+00:00".into(),
        }
    }

    #[test]
    fn test_append_and_list() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.last_activity_hash().unwrap().is_none());

        let first = db.insert_activity(&entry("h1", "h0")).unwrap();
        let second = db.insert_activity(&entry("h2", "h1")).unwrap();
        assert!(second > first);
        assert_eq!(db.last_activity_hash().unwrap().as_deref(), Some("h2"));

        let all = db.list_all_activity().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].sequence, first);
        assert_eq!(all[1].action, ActivityAction::Create);

        let recent = db.list_recent_activity(1).unwrap();
        assert_eq!(recent[0].hash, "h2");
        assert_eq!(db.list_activity_for("service", "svc-1").unwrap().len(), 2);
    }

    #[test]
    fn test_log_rejects_edits() {
        let db = Database::open_in_memory().unwrap();
        db.insert_activity(&entry("h1", "h0")).unwrap();
        assert!(db
            .conn()
            .execute("UPDATE activity_log SET description = 'x'", [])
            .is_err());
        assert!(db.conn().execute("DELETE FROM activity_log", []).is_err());
    }
}

//! Service catalogue operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{now_rfc3339, Database, DbResult};
use crate::models::Service;

const SERVICE_COLUMNS: &str =
    "service_id, name, description, price, active, created_at, updated_at";

fn map_service(row: &Row<'_>) -> rusqlite::Result<Service> {
    Ok(Service {
        service_id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        price: row.get(3)?,
        active: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl Database {
    pub fn insert_service(&self, service: &Service) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO services (
                service_id, name, description, price, active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                service.service_id,
                service.name,
                service.description,
                service.price,
                service.active,
                service.created_at,
                service.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_service(&self, service_id: &str) -> DbResult<Option<Service>> {
        let sql = format!("SELECT {} FROM services WHERE service_id = ?", SERVICE_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, [service_id], map_service)
            .optional()?)
    }

    /// List services by name. Inactive services are skipped when `active_only`.
    pub fn list_services(&self, active_only: bool) -> DbResult<Vec<Service>> {
        let sql = format!(
            "SELECT {} FROM services WHERE (?1 = 0 OR active = 1) ORDER BY name",
            SERVICE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([active_only], map_service)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Overwrite name, description and price.
    pub fn update_service(&self, service: &Service) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE services SET
                name = ?2,
                description = ?3,
                price = ?4,
                updated_at = ?5
            WHERE service_id = ?1
            "#,
            params![
                service.service_id,
                service.name,
                service.description,
                service.price,
                now_rfc3339(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Enable or disable a service. Disabled services keep their history.
    pub fn set_service_active(&self, service_id: &str, active: bool) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE services SET active = ?2, updated_at = ?3 WHERE service_id = ?1",
            params![service_id, active, now_rfc3339()],
        )?;
        Ok(rows_affected > 0)
    }
}

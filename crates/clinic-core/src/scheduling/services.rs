//! Service catalogue management.

use tracing::info;

use crate::audit::ActivityLog;
use crate::db::Database;
use crate::error::{ClinicError, ClinicResult};
use crate::models::{ActivityAction, Service, ServiceInput};

fn check_input(input: &ServiceInput) -> ClinicResult<()> {
    if input.name.trim().is_empty() {
        return Err(ClinicError::invalid_input("name", "is required"));
    }
    if input.price < 0 {
        return Err(ClinicError::InvalidAmount {
            amount: input.price,
            reason: "service price cannot be negative".into(),
        });
    }
    Ok(())
}

/// Bookable services. Rows are disabled, never deleted.
pub struct ServiceCatalog<'a> {
    db: &'a Database,
}

impl<'a> ServiceCatalog<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create(&self, input: &ServiceInput, actor: &str) -> ClinicResult<Service> {
        check_input(input)?;
        let mut service = Service::new(input.name.trim().to_string(), input.price);
        service.description = input.description.clone();

        self.db.write_transaction(|db| {
            db.insert_service(&service)?;
            ActivityLog::new(db).append(
                actor,
                ActivityAction::Create,
                "service",
                &service.service_id,
                format!("Added service {}", service.name),
            )?;
            Ok::<_, ClinicError>(())
        })?;
        info!(service_id = %service.service_id, name = %service.name, "service created");
        Ok(service)
    }

    pub fn update(&self, service_id: &str, input: &ServiceInput, actor: &str) -> ClinicResult<Service> {
        check_input(input)?;
        self.db.write_transaction(|db| {
            let mut service = db
                .get_service(service_id)?
                .ok_or_else(|| ClinicError::not_found("Service", service_id))?;
            service.name = input.name.trim().to_string();
            service.description = input.description.clone();
            service.price = input.price;
            db.update_service(&service)?;

            ActivityLog::new(db).append(
                actor,
                ActivityAction::Update,
                "service",
                service_id,
                format!("Updated service {}", service.name),
            )?;
            Ok(service)
        })
    }

    /// Enable or disable a service for new bookings.
    pub fn set_active(&self, service_id: &str, active: bool, actor: &str) -> ClinicResult<Service> {
        self.db.write_transaction(|db| {
            if !db.set_service_active(service_id, active)? {
                return Err(ClinicError::not_found("Service", service_id));
            }
            ActivityLog::new(db).append(
                actor,
                ActivityAction::Update,
                "service",
                service_id,
                if active { "Service enabled" } else { "Service disabled" },
            )?;
            db.get_service(service_id)?
                .ok_or_else(|| ClinicError::not_found("Service", service_id))
        })
    }

    pub fn get(&self, service_id: &str) -> ClinicResult<Service> {
        self.db
            .get_service(service_id)?
            .ok_or_else(|| ClinicError::not_found("Service", service_id))
    }

    pub fn list(&self, active_only: bool) -> ClinicResult<Vec<Service>> {
        Ok(self.db.list_services(active_only)?)
    }
}

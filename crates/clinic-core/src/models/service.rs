//! Bookable service models.

use serde::{Deserialize, Serialize};

use super::Cents;

/// A bookable offering of the clinic.
///
/// Services are soft-disabled rather than deleted so historical bookings
/// keep a valid reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    /// Unique service ID
    pub service_id: String,
    /// Display name (e.g., "Dermatology Consultation")
    pub name: String,
    /// Longer description shown to patients
    pub description: String,
    /// Price in centavos
    pub price: Cents,
    /// Whether new bookings may reference this service
    pub active: bool,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
}

impl Service {
    /// Create a new active service.
    pub fn new(name: String, price: Cents) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            service_id: uuid::Uuid::new_v4().to_string(),
            name,
            description: String::new(),
            price,
            active: true,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Staff input for creating or editing a service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServiceInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Cents,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_service_is_active() {
        let service = Service::new("Consult".into(), 50000);
        assert!(service.active);
        assert_eq!(service.price, 50000);
        assert_eq!(service.service_id.len(), 36);
    }
}

//! Booking models: the appointment slot request and its lifecycle states.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Booking lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BookingStatus {
    /// Submitted through public intake, awaiting staff review
    Pending,
    /// Accepted by staff; patient, medical record and billing exist
    Confirmed,
    /// Declined or cancelled (terminal)
    Cancelled,
    /// Consultation finished (terminal)
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "cancelled" => Some(BookingStatus::Cancelled),
            "completed" => Some(BookingStatus::Completed),
            _ => None,
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "Pending",
            BookingStatus::Confirmed => "Confirmed",
            BookingStatus::Cancelled => "Cancelled",
            BookingStatus::Completed => "Completed",
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }
}

/// Consultation progress, only meaningful once a booking is confirmed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConsultationStatus {
    NotYet,
    Ongoing,
    Done,
}

impl ConsultationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsultationStatus::NotYet => "not_yet",
            ConsultationStatus::Ongoing => "ongoing",
            ConsultationStatus::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_yet" => Some(ConsultationStatus::NotYet),
            "ongoing" => Some(ConsultationStatus::Ongoing),
            "done" => Some(ConsultationStatus::Done),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConsultationStatus::NotYet => "Not Yet",
            ConsultationStatus::Ongoing => "Ongoing",
            ConsultationStatus::Done => "Done",
        }
    }
}

/// Contact details captured at intake.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientContact {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// A unique (service, date, time) combination holding at most one active booking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Slot {
    pub service_id: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

/// A requested appointment slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    /// Unique booking ID
    pub booking_id: String,
    /// Booked service
    pub service_id: String,
    /// Patient full name as entered
    pub patient_name: String,
    /// Patient email as entered
    pub patient_email: String,
    /// Patient phone as entered
    pub patient_phone: String,
    /// Appointment date
    pub date: NaiveDate,
    /// Appointment time (slot start)
    pub time: NaiveTime,
    /// Lifecycle status
    pub status: BookingStatus,
    /// Consultation progress
    pub consultation_status: ConsultationStatus,
    /// Free-text notes or special requests
    pub notes: String,
    /// Staff member who entered the booking (None for public intake)
    pub created_by: Option<String>,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
}

impl Booking {
    /// Create a pending booking from a validated request.
    pub fn from_request(request: &ValidatedBooking) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            booking_id: uuid::Uuid::new_v4().to_string(),
            service_id: request.slot.service_id.clone(),
            patient_name: request.contact.name.clone(),
            patient_email: request.contact.email.clone(),
            patient_phone: request.contact.phone.clone(),
            date: request.slot.date,
            time: request.slot.time,
            status: BookingStatus::Pending,
            consultation_status: ConsultationStatus::NotYet,
            notes: request.notes.clone(),
            created_by: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn contact(&self) -> PatientContact {
        PatientContact {
            name: self.patient_name.clone(),
            email: self.patient_email.clone(),
            phone: self.patient_phone.clone(),
        }
    }

    pub fn slot(&self) -> Slot {
        Slot {
            service_id: self.service_id.clone(),
            date: self.date,
            time: self.time,
        }
    }
}

/// Raw intake payload from the public booking form.
///
/// Date and time arrive as text (`YYYY-MM-DD`, `HH:MM`) and are parsed
/// during validation; unknown fields are rejected at deserialization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BookingRequest {
    pub service_id: String,
    pub date: String,
    pub time: String,
    pub patient_name: String,
    pub patient_email: String,
    pub patient_phone: String,
    #[serde(default)]
    pub notes: String,
}

/// A booking request that passed field validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedBooking {
    pub slot: Slot,
    pub contact: PatientContact,
    pub notes: String,
}

/// Filter for bulk booking queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingFilter {
    /// Earliest appointment date (inclusive)
    pub from: Option<NaiveDate>,
    /// Latest appointment date (inclusive)
    pub to: Option<NaiveDate>,
    pub status: Option<BookingStatus>,
    pub service_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::Cancelled,
            BookingStatus::Completed,
        ] {
            assert_eq!(BookingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(BookingStatus::parse("archived"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!BookingStatus::Pending.is_terminal());
        assert!(!BookingStatus::Confirmed.is_terminal());
        assert!(BookingStatus::Cancelled.is_terminal());
        assert!(BookingStatus::Completed.is_terminal());
    }

    #[test]
    fn test_consultation_progress_ordering() {
        assert!(ConsultationStatus::NotYet < ConsultationStatus::Ongoing);
        assert!(ConsultationStatus::Ongoing < ConsultationStatus::Done);
    }

    #[test]
    fn test_request_rejects_unknown_fields() {
        let json = r#"{
            "service_id": "svc", "date": "2030-01-02", "time": "09:00",
            "patient_name": "Ana", "patient_email": "ana@example.com",
            "patient_phone": "09171234567", "status": "confirmed"
        }"#;
        assert!(serde_json::from_str::<BookingRequest>(json).is_err());
    }
}

//! Outbound booking notifications.
//!
//! Events are dispatched after the owning transaction commits. Delivery is
//! best-effort: a failing notifier is logged and never fails the operation.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{Booking, BookingStatus, PatientContact};

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

/// A booking was created or changed status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingEvent {
    pub booking_id: String,
    /// `None` when the booking was just created
    pub old_status: Option<BookingStatus>,
    pub new_status: BookingStatus,
    pub contact: PatientContact,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl BookingEvent {
    pub fn new(booking: &Booking, old_status: Option<BookingStatus>) -> Self {
        Self {
            booking_id: booking.booking_id.clone(),
            old_status,
            new_status: booking.status,
            contact: booking.contact(),
            date: booking.date,
            time: booking.time,
        }
    }
}

/// Receives booking events (email gateway, SMS, message queue).
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &BookingEvent) -> Result<(), NotifyError>;
}

/// Notifier that only writes a log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &BookingEvent) -> Result<(), NotifyError> {
        info!(
            booking_id = %event.booking_id,
            old_status = event.old_status.map(|s| s.as_str()).unwrap_or("none"),
            new_status = event.new_status.as_str(),
            "booking event"
        );
        Ok(())
    }
}

/// Send an event, logging and swallowing any failure.
pub(crate) fn dispatch(notifier: &dyn Notifier, event: &BookingEvent) {
    if let Err(e) = notifier.notify(event) {
        warn!(booking_id = %event.booking_id, error = %e, "notification dispatch failed");
    }
}

/// Subject and body of the message a patient receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub body: String,
}

/// Render the patient-facing message for an event.
pub fn compose(event: &BookingEvent, clinic_name: &str) -> Message {
    let when = format!(
        "{} at {}",
        event.date.format("%A, %B %-d, %Y"),
        event.time.format("%-I:%M %p")
    );
    let greeting = format!("Dear {},", event.contact.name);

    let (subject, line) = match (event.old_status, event.new_status) {
        (None, BookingStatus::Pending) => (
            "Booking request received",
            format!("We received your booking request for {}. We will confirm it shortly.", when),
        ),
        (_, BookingStatus::Confirmed) => (
            "Booking confirmed",
            format!("Your appointment on {} is confirmed. Please arrive 10 minutes early.", when),
        ),
        (Some(BookingStatus::Pending), BookingStatus::Cancelled) => (
            "Booking request declined",
            format!(
                "We are sorry, we cannot accommodate your request for {}. Please choose another slot.",
                when
            ),
        ),
        (_, BookingStatus::Cancelled) => (
            "Appointment cancelled",
            format!("Your appointment on {} has been cancelled.", when),
        ),
        (_, BookingStatus::Completed) => (
            "Thank you for your visit",
            format!("Your appointment on {} is complete. We hope to see you again.", when),
        ),
        (_, BookingStatus::Pending) => (
            "Booking update",
            format!("Your booking for {} is awaiting confirmation.", when),
        ),
    };

    Message {
        subject: format!("{}: {}", clinic_name, subject),
        body: format!("{}\n\n{}\n\n{}", greeting, line, clinic_name),
    }
}

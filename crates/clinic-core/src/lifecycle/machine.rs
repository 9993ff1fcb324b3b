//! Booking lifecycle state machine.
//!
//! ```text
//!            accept                 complete
//!  Pending ─────────▶ Confirmed ─────────────▶ Completed
//!     │                   │
//!     │ decline           │ cancel
//!     ▼                   ▼
//!  Cancelled ◀────────────┘
//! ```
//!
//! Every transition is a guarded update on the expected status, so two
//! staff members acting on the same booking cannot both succeed. The loser
//! gets `StaleBookingState` with the status it found.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{error, info};

use crate::audit::ActivityLog;
use crate::config::ClinicRules;
use crate::db::{now_rfc3339, Database, DbError};
use crate::error::{ClinicError, ClinicResult};
use crate::models::{
    ActivityAction, Booking, BookingFilter, BookingRequest, BookingStatus, ConsultationStatus,
};
use crate::scheduling::{validate_request, BookingChannel, SlotAllocator};

use super::notify::{dispatch, BookingEvent, Notifier};
use super::records::{open_visit, AcceptanceOutcome};

const PUBLIC_ACTOR: &str = "public";

fn integrity(operation: &str, booking_id: &str, err: DbError) -> ClinicError {
    error!(booking_id = %booking_id, error = %err, "{} rolled back", operation);
    ClinicError::Integrity {
        operation: operation.to_string(),
        reason: err.to_string(),
    }
}

/// Load a booking that must exist.
fn load(db: &Database, booking_id: &str) -> ClinicResult<Booking> {
    db.get_booking(booking_id)?
        .ok_or_else(|| ClinicError::not_found("Booking", booking_id))
}

/// Error for a guarded update that found the booking elsewhere.
fn stale(db: &Database, booking_id: &str) -> ClinicError {
    match db.get_booking(booking_id) {
        Ok(Some(booking)) => ClinicError::StaleBookingState {
            booking_id: booking_id.to_string(),
            status: booking.status,
        },
        Ok(None) => ClinicError::not_found("Booking", booking_id),
        Err(e) => e.into(),
    }
}

/// Drives bookings through their states.
pub struct BookingLifecycle<'a> {
    db: &'a Database,
    rules: &'a ClinicRules,
    notifier: &'a dyn Notifier,
    clock: Option<NaiveDateTime>,
}

impl<'a> BookingLifecycle<'a> {
    pub fn new(db: &'a Database, rules: &'a ClinicRules, notifier: &'a dyn Notifier) -> Self {
        Self {
            db,
            rules,
            notifier,
            clock: None,
        }
    }

    /// Evaluate date rules as of `now` instead of the local clock.
    pub fn at(mut self, now: NaiveDateTime) -> Self {
        self.clock = Some(now);
        self
    }

    fn now(&self) -> NaiveDateTime {
        self.clock
            .unwrap_or_else(|| chrono::Local::now().naive_local())
    }

    /// Public intake: validate, allocate the slot and create a Pending booking.
    pub fn submit(&self, request: &BookingRequest) -> ClinicResult<Booking> {
        let validated = validate_request(self.db, request)?;
        let booking = Booking::from_request(&validated);
        let now = self.now();

        self.db.write_transaction(|db| {
            SlotAllocator::new(db, self.rules).reserve(&booking, BookingChannel::Public, &now)?;
            ActivityLog::new(db).append(
                PUBLIC_ACTOR,
                ActivityAction::Create,
                "booking",
                &booking.booking_id,
                format!(
                    "Booking requested for {} {}",
                    booking.date,
                    booking.time.format("%H:%M")
                ),
            )?;
            Ok::<_, ClinicError>(())
        })?;

        info!(booking_id = %booking.booking_id, date = %booking.date, "booking submitted");
        dispatch(self.notifier, &BookingEvent::new(&booking, None));
        Ok(booking)
    }

    /// Staff entry: the booking starts Confirmed with its records in place.
    pub fn create_staff_booking(&self, request: &BookingRequest, actor: &str) -> ClinicResult<AcceptanceOutcome> {
        let validated = validate_request(self.db, request)?;
        let mut booking = Booking::from_request(&validated);
        booking.status = BookingStatus::Confirmed;
        booking.created_by = Some(actor.to_string());
        let now = self.now();

        let outcome = self.db.write_transaction(|db| {
            SlotAllocator::new(db, self.rules).reserve(&booking, BookingChannel::Staff, &now)?;
            let visit = open_visit(db, self.rules, &booking, actor)
                .map_err(|e| integrity("staff booking", &booking.booking_id, e))?;
            ActivityLog::new(db).append(
                actor,
                ActivityAction::Create,
                "booking",
                &booking.booking_id,
                format!(
                    "Staff booking for {} {}",
                    booking.date,
                    booking.time.format("%H:%M")
                ),
            )?;
            Ok::<_, ClinicError>(visit.with_booking(booking.clone()))
        })?;

        info!(booking_id = %outcome.booking.booking_id, actor = %actor, "staff booking created");
        dispatch(self.notifier, &BookingEvent::new(&outcome.booking, None));
        Ok(outcome)
    }

    /// Pending → Confirmed, creating patient, medical record and billing
    /// in the same transaction.
    pub fn accept(&self, booking_id: &str, actor: &str) -> ClinicResult<AcceptanceOutcome> {
        let outcome = self.db.write_transaction(|db| {
            let mut booking = load(db, booking_id)?;
            if !db.transition_booking_status(booking_id, BookingStatus::Pending, BookingStatus::Confirmed)? {
                return Err(stale(db, booking_id));
            }
            booking.status = BookingStatus::Confirmed;
            booking.updated_at = now_rfc3339();

            let visit = open_visit(db, self.rules, &booking, actor)
                .map_err(|e| integrity("accept booking", booking_id, e))?;
            ActivityLog::new(db).append(
                actor,
                ActivityAction::Accept,
                "booking",
                booking_id,
                format!("Accepted booking for {}", booking.patient_name),
            )?;
            Ok(visit.with_booking(booking))
        })?;

        info!(
            booking_id = %booking_id,
            patient_id = %outcome.patient.patient_id,
            patient_created = outcome.patient_created,
            flagged = outcome.match_flag.is_some(),
            "booking accepted"
        );
        dispatch(
            self.notifier,
            &BookingEvent::new(&outcome.booking, Some(BookingStatus::Pending)),
        );
        Ok(outcome)
    }

    /// Pending → Cancelled.
    pub fn decline(&self, booking_id: &str, actor: &str) -> ClinicResult<Booking> {
        self.change_status(
            booking_id,
            BookingStatus::Pending,
            BookingStatus::Cancelled,
            ActivityAction::Decline,
            actor,
        )
    }

    /// Confirmed → Cancelled. Records and billing stay as they are.
    pub fn cancel(&self, booking_id: &str, actor: &str) -> ClinicResult<Booking> {
        self.change_status(
            booking_id,
            BookingStatus::Confirmed,
            BookingStatus::Cancelled,
            ActivityAction::Cancel,
            actor,
        )
    }

    fn change_status(
        &self,
        booking_id: &str,
        expected: BookingStatus,
        next: BookingStatus,
        action: ActivityAction,
        actor: &str,
    ) -> ClinicResult<Booking> {
        let booking = self.db.write_transaction(|db| {
            if !db.transition_booking_status(booking_id, expected, next)? {
                return Err(stale(db, booking_id));
            }
            ActivityLog::new(db).append(
                actor,
                action,
                "booking",
                booking_id,
                format!("{} -> {}", expected.label(), next.label()),
            )?;
            load(db, booking_id)
        })?;

        info!(booking_id = %booking_id, from = expected.as_str(), to = next.as_str(), "booking status changed");
        dispatch(self.notifier, &BookingEvent::new(&booking, Some(expected)));
        Ok(booking)
    }

    /// Not Yet → Ongoing.
    pub fn start_consultation(&self, booking_id: &str, actor: &str) -> ClinicResult<Booking> {
        self.advance_consultation(booking_id, ConsultationStatus::Ongoing, actor)
    }

    /// Not Yet or Ongoing → Done. The booking stays Confirmed.
    pub fn finish_consultation(&self, booking_id: &str, actor: &str) -> ClinicResult<Booking> {
        self.advance_consultation(booking_id, ConsultationStatus::Done, actor)
    }

    fn advance_consultation(
        &self,
        booking_id: &str,
        next: ConsultationStatus,
        actor: &str,
    ) -> ClinicResult<Booking> {
        self.db.write_transaction(|db| {
            let booking = load(db, booking_id)?;
            let current = booking.consultation_status;
            let moved = booking.status == BookingStatus::Confirmed
                && current < next
                && db.transition_consultation_status(booking_id, current, next)?;
            if !moved {
                return Err(ClinicError::StaleBookingState {
                    booking_id: booking_id.to_string(),
                    status: booking.status,
                });
            }
            ActivityLog::new(db).append(
                actor,
                ActivityAction::Update,
                "booking",
                booking_id,
                format!("Consultation {} -> {}", current.label(), next.label()),
            )?;
            info!(booking_id = %booking_id, consultation = next.as_str(), "consultation advanced");
            load(db, booking_id)
        })
    }

    /// Confirmed → Completed, closing the consultation.
    pub fn complete(&self, booking_id: &str, actor: &str) -> ClinicResult<Booking> {
        let booking = self.db.write_transaction(|db| {
            if !db.complete_booking(booking_id)? {
                return Err(stale(db, booking_id));
            }
            ActivityLog::new(db).append(
                actor,
                ActivityAction::Complete,
                "booking",
                booking_id,
                "Confirmed -> Completed",
            )?;
            load(db, booking_id)
        })?;

        info!(booking_id = %booking_id, "booking completed");
        dispatch(
            self.notifier,
            &BookingEvent::new(&booking, Some(BookingStatus::Confirmed)),
        );
        Ok(booking)
    }

    /// Hard-delete a booking that is still Pending.
    pub fn delete_pending(&self, booking_id: &str, actor: &str) -> ClinicResult<()> {
        self.db.write_transaction(|db| {
            if !db.delete_pending_booking(booking_id)? {
                return Err(stale(db, booking_id));
            }
            ActivityLog::new(db).append(
                actor,
                ActivityAction::Delete,
                "booking",
                booking_id,
                "Deleted pending booking",
            )?;
            Ok(())
        })?;
        info!(booking_id = %booking_id, "pending booking deleted");
        Ok(())
    }

    pub fn get(&self, booking_id: &str) -> ClinicResult<Booking> {
        load(self.db, booking_id)
    }

    pub fn list(&self, filter: &BookingFilter) -> ClinicResult<Vec<Booking>> {
        Ok(self.db.list_bookings(filter)?)
    }

    /// Open times a public client may still request.
    pub fn available_times(&self, service_id: &str, date: &NaiveDate) -> ClinicResult<Vec<NaiveTime>> {
        SlotAllocator::new(self.db, self.rules).available_times(
            service_id,
            date,
            BookingChannel::Public,
            &self.now(),
        )
    }
}

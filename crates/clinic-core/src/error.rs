//! Domain error taxonomy.

use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;

use crate::db::DbError;
use crate::models::{BookingStatus, Cents, SaleStatus};

/// How a caller should treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller-correctable input; show the reason, never retry.
    Validation,
    /// Concurrent state moved on; refresh and retry by hand.
    Conflict,
    /// A multi-step unit of work failed and was rolled back.
    Integrity,
    NotFound,
    Internal,
}

/// Errors returned by every clinic operation.
#[derive(Error, Debug)]
pub enum ClinicError {
    #[error("Date {date} is too early; bookings open from {earliest}")]
    InvalidDate { date: NaiveDate, earliest: NaiveDate },

    #[error("Clinic is closed on {date}: {reason}")]
    ClinicClosed { date: NaiveDate, reason: String },

    #[error("Time {} is outside operating hours {}-{}", .time.format("%H:%M"), .opening.format("%H:%M"), .closing.format("%H:%M"))]
    OutsideHours {
        time: NaiveTime,
        opening: NaiveTime,
        closing: NaiveTime,
    },

    #[error("Time {} is not on a {slot_minutes}-minute slot boundary", .time.format("%H:%M"))]
    InvalidSlotAlignment { time: NaiveTime, slot_minutes: u32 },

    #[error("Invalid amount {amount}: {reason}")]
    InvalidAmount { amount: Cents, reason: String },

    #[error("Invalid {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Service {0} is not available for booking")]
    ServiceUnavailable(String),

    #[error("Slot {date} {} is already taken", .time.format("%H:%M"))]
    SlotTaken { date: NaiveDate, time: NaiveTime },

    #[error("Booking {booking_id} is {}; the requested change no longer applies", .status.label())]
    StaleBookingState {
        booking_id: String,
        status: BookingStatus,
    },

    #[error("Payment of {amount} exceeds outstanding balance {balance}")]
    OverpaymentRejected { amount: Cents, balance: Cents },

    #[error("Insufficient stock for {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: String,
        requested: i64,
        available: i64,
    },

    #[error("Sale {0} is no longer pending and cannot be cancelled")]
    SaleNotCancellable(String),

    #[error("Sale {receipt_number} is already {}", .status.as_str())]
    SaleNotPending {
        receipt_number: String,
        status: SaleStatus,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Could not complete {operation}: {reason}")]
    Integrity { operation: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl ClinicError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClinicError::InvalidDate { .. }
            | ClinicError::ClinicClosed { .. }
            | ClinicError::OutsideHours { .. }
            | ClinicError::InvalidSlotAlignment { .. }
            | ClinicError::InvalidAmount { .. }
            | ClinicError::InvalidInput { .. }
            | ClinicError::ServiceUnavailable(_) => ErrorKind::Validation,
            ClinicError::SlotTaken { .. }
            | ClinicError::StaleBookingState { .. }
            | ClinicError::OverpaymentRejected { .. }
            | ClinicError::InsufficientStock { .. }
            | ClinicError::SaleNotCancellable(_)
            | ClinicError::SaleNotPending { .. } => ErrorKind::Conflict,
            ClinicError::Integrity { .. } => ErrorKind::Integrity,
            ClinicError::NotFound { .. } => ErrorKind::NotFound,
            ClinicError::Database(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: &str) -> Self {
        ClinicError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn out_of_range(amount: Cents, what: &str) -> Self {
        ClinicError::InvalidAmount {
            amount,
            reason: format!("{} is out of range", what),
        }
    }

    pub(crate) fn invalid_input(field: &str, reason: impl Into<String>) -> Self {
        ClinicError::InvalidInput {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

pub type ClinicResult<T> = Result<T, ClinicError>;

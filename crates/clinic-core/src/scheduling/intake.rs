//! Public intake validation.
//!
//! Untrusted form input is parsed into a [`ValidatedBooking`] before any
//! slot rule or storage code sees it.

use chrono::{NaiveDate, NaiveTime};

use crate::db::Database;
use crate::error::{ClinicError, ClinicResult};
use crate::models::{BookingRequest, PatientContact, Slot, ValidatedBooking};

const MAX_NAME_LEN: usize = 100;
const MAX_NOTES_LEN: usize = 2000;
const MIN_PHONE_DIGITS: usize = 9;
const MAX_PHONE_DIGITS: usize = 15;

/// Validate a booking request and resolve its service.
pub fn validate_request(db: &Database, request: &BookingRequest) -> ClinicResult<ValidatedBooking> {
    let date = parse_request_date(&request.date)?;
    let time = parse_request_time(&request.time)?;
    let contact = validate_contact(
        &request.patient_name,
        &request.patient_email,
        &request.patient_phone,
    )?;

    let notes = request.notes.trim();
    if notes.chars().count() > MAX_NOTES_LEN {
        return Err(ClinicError::invalid_input(
            "notes",
            format!("must be at most {} characters", MAX_NOTES_LEN),
        ));
    }

    let service_id = request.service_id.trim();
    match db.get_service(service_id)? {
        Some(service) if service.active => {}
        _ => return Err(ClinicError::ServiceUnavailable(service_id.to_string())),
    }

    Ok(ValidatedBooking {
        slot: Slot {
            service_id: service_id.to_string(),
            date,
            time,
        },
        contact,
        notes: notes.to_string(),
    })
}

/// Validate and normalize patient contact details.
pub fn validate_contact(name: &str, email: &str, phone: &str) -> ClinicResult<PatientContact> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ClinicError::invalid_input("patient_name", "is required"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ClinicError::invalid_input(
            "patient_name",
            format!("must be at most {} characters", MAX_NAME_LEN),
        ));
    }

    let email = email.trim();
    if !is_valid_email(email) {
        return Err(ClinicError::invalid_input(
            "patient_email",
            "must look like name@example.com",
        ));
    }

    let phone = phone.trim();
    if !is_valid_phone(phone) {
        return Err(ClinicError::invalid_input(
            "patient_phone",
            format!(
                "must contain {} to {} digits",
                MIN_PHONE_DIGITS, MAX_PHONE_DIGITS
            ),
        ));
    }

    Ok(PatientContact {
        name: name.to_string(),
        email: email.to_string(),
        phone: phone.to_string(),
    })
}

pub fn parse_request_date(s: &str) -> ClinicResult<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| ClinicError::invalid_input("date", format!("'{}' is not YYYY-MM-DD", s)))
}

/// Accepts `HH:MM` or `HH:MM:SS`.
pub fn parse_request_time(s: &str) -> ClinicResult<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| ClinicError::invalid_input("time", format!("'{}' is not HH:MM", s)))
}

fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        _ => false,
    }
}

fn is_valid_phone(phone: &str) -> bool {
    let compact: String = phone
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();
    let digits = compact.strip_prefix('+').unwrap_or(&compact);
    (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits.len())
        && digits.chars().all(|c| c.is_ascii_digit())
}

//! Booking intake and lifecycle integration tests.

use chrono::{NaiveDate, NaiveDateTime};
use clinic_core::db::Database;
use clinic_core::lifecycle::{BookingLifecycle, LogNotifier};
use clinic_core::models::{Billing, BookingRequest, BookingStatus, Service};
use clinic_core::{ClinicError, ClinicRules, ErrorKind};

/// Tuesday morning; the next day is the first bookable one.
fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2030, 1, 1)
        .unwrap()
        .and_hms_opt(10, 15, 0)
        .unwrap()
}

fn consult(db: &Database) -> Service {
    let service = Service::new("Consult".into(), 75000);
    db.insert_service(&service).unwrap();
    service
}

fn request(service: &Service, date: &str, time: &str) -> BookingRequest {
    BookingRequest {
        service_id: service.service_id.clone(),
        date: date.into(),
        time: time.into(),
        patient_name: "Maria Santos".into(),
        patient_email: "maria@example.com".into(),
        patient_phone: "0918 555 0101".into(),
        notes: "Recurring rash".into(),
    }
}

fn count(db: &Database, table: &str) -> i64 {
    db.conn()
        .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
        .unwrap()
}

#[test]
fn test_same_slot_twice_is_taken() {
    let db = Database::open_in_memory().unwrap();
    let rules = ClinicRules::default();
    let lifecycle = BookingLifecycle::new(&db, &rules, &LogNotifier).at(now());
    let svc = consult(&db);

    let first = lifecycle.submit(&request(&svc, "2030-01-02", "09:00")).unwrap();
    assert_eq!(first.status, BookingStatus::Pending);

    let err = lifecycle
        .submit(&request(&svc, "2030-01-02", "09:00"))
        .unwrap_err();
    assert!(matches!(err, ClinicError::SlotTaken { .. }));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(count(&db, "bookings"), 1);
}

#[test]
fn test_accept_creates_one_patient_record_and_billing() {
    let db = Database::open_in_memory().unwrap();
    let rules = ClinicRules::default();
    let lifecycle = BookingLifecycle::new(&db, &rules, &LogNotifier).at(now());
    let svc = consult(&db);

    let booking = lifecycle.submit(&request(&svc, "2030-01-02", "09:00")).unwrap();
    let outcome = lifecycle.accept(&booking.booking_id, "dr.cruz").unwrap();

    assert_eq!(outcome.booking.status, BookingStatus::Confirmed);
    assert_eq!(outcome.billing.balance, svc.price);
    assert!(!outcome.billing.paid);
    assert_eq!(outcome.record.chief_complaint, "Recurring rash");
    assert_eq!(count(&db, "patients"), 1);
    assert_eq!(count(&db, "medical_records"), 1);
    assert_eq!(count(&db, "billings"), 1);
}

#[test]
fn test_accept_twice_succeeds_once() {
    let db = Database::open_in_memory().unwrap();
    let rules = ClinicRules::default();
    let lifecycle = BookingLifecycle::new(&db, &rules, &LogNotifier).at(now());
    let svc = consult(&db);

    let booking = lifecycle.submit(&request(&svc, "2030-01-02", "09:00")).unwrap();
    lifecycle.accept(&booking.booking_id, "dr.cruz").unwrap();

    match lifecycle.accept(&booking.booking_id, "nurse.lim") {
        Err(ClinicError::StaleBookingState { status, .. }) => {
            assert_eq!(status, BookingStatus::Confirmed)
        }
        other => panic!("expected stale booking, got {:?}", other.map(|o| o.booking.status)),
    }
    assert_eq!(count(&db, "patients"), 1);
    assert_eq!(count(&db, "medical_records"), 1);
    assert_eq!(count(&db, "billings"), 1);
}

#[test]
fn test_failed_acceptance_rolls_back_everything() {
    let db = Database::open_in_memory().unwrap();
    let rules = ClinicRules::default();
    let lifecycle = BookingLifecycle::new(&db, &rules, &LogNotifier).at(now());
    let svc = consult(&db);

    let booking = lifecycle.submit(&request(&svc, "2030-01-02", "09:00")).unwrap();
    // A stray bill for this booking makes the billing step fail.
    db.insert_billing(&Billing::new(booking.booking_id.clone(), 100))
        .unwrap();
    let activity_before = count(&db, "activity_log");

    let err = lifecycle.accept(&booking.booking_id, "dr.cruz").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integrity);

    assert_eq!(
        lifecycle.get(&booking.booking_id).unwrap().status,
        BookingStatus::Pending
    );
    assert_eq!(count(&db, "patients"), 0);
    assert_eq!(count(&db, "medical_records"), 0);
    assert_eq!(count(&db, "billings"), 1);
    assert_eq!(count(&db, "activity_log"), activity_before);
}

#[test]
fn test_last_slot_of_day_is_bookable() {
    let db = Database::open_in_memory().unwrap();
    let rules = ClinicRules::default();
    let lifecycle = BookingLifecycle::new(&db, &rules, &LogNotifier).at(now());
    let svc = consult(&db);

    assert!(lifecycle.submit(&request(&svc, "2030-01-02", "17:00")).is_ok());
    assert!(lifecycle.submit(&request(&svc, "2030-01-02", "08:00")).is_ok());
    assert!(matches!(
        lifecycle.submit(&request(&svc, "2030-01-02", "17:30")),
        Err(ClinicError::OutsideHours { .. })
    ));
    assert!(matches!(
        lifecycle.submit(&request(&svc, "2030-01-02", "07:30")),
        Err(ClinicError::OutsideHours { .. })
    ));
    assert!(matches!(
        lifecycle.submit(&request(&svc, "2030-01-02", "09:15")),
        Err(ClinicError::InvalidSlotAlignment { .. })
    ));
}

#[test]
fn test_lead_time_boundary() {
    let db = Database::open_in_memory().unwrap();
    let rules = ClinicRules::default();
    let svc = consult(&db);

    // One minute before midnight still counts as today.
    let late = NaiveDate::from_ymd_opt(2030, 1, 1)
        .unwrap()
        .and_hms_opt(23, 59, 0)
        .unwrap();
    let lifecycle = BookingLifecycle::new(&db, &rules, &LogNotifier).at(late);

    assert!(lifecycle.submit(&request(&svc, "2030-01-02", "08:00")).is_ok());
    match lifecycle.submit(&request(&svc, "2030-01-01", "16:00")) {
        Err(ClinicError::InvalidDate { earliest, .. }) => {
            assert_eq!(earliest, NaiveDate::from_ymd_opt(2030, 1, 2).unwrap())
        }
        other => panic!("expected invalid date, got {:?}", other.map(|b| b.status)),
    }
}

#[test]
fn test_closed_days_are_rejected() {
    let db = Database::open_in_memory().unwrap();
    let rules = ClinicRules::default();
    let lifecycle = BookingLifecycle::new(&db, &rules, &LogNotifier).at(now());
    let svc = consult(&db);

    // 2030-01-06 is a Sunday.
    assert!(matches!(
        lifecycle.submit(&request(&svc, "2030-01-06", "09:00")),
        Err(ClinicError::ClinicClosed { .. })
    ));

    let holiday = NaiveDate::from_ymd_opt(2030, 1, 3).unwrap();
    db.add_blocked_date(&holiday, "Clinic anniversary", Some("admin"))
        .unwrap();
    match lifecycle.submit(&request(&svc, "2030-01-03", "09:00")) {
        Err(ClinicError::ClinicClosed { reason, .. }) => assert_eq!(reason, "Clinic anniversary"),
        other => panic!("expected closed clinic, got {:?}", other.map(|b| b.status)),
    }
    assert!(lifecycle.available_times(&svc.service_id, &holiday).unwrap().is_empty());
}

#[test]
fn test_cancelled_slot_can_be_rebooked() {
    let db = Database::open_in_memory().unwrap();
    let rules = ClinicRules::default();
    let lifecycle = BookingLifecycle::new(&db, &rules, &LogNotifier).at(now());
    let svc = consult(&db);

    let first = lifecycle.submit(&request(&svc, "2030-01-02", "10:00")).unwrap();
    lifecycle.decline(&first.booking_id, "dr.cruz").unwrap();

    let second = lifecycle.submit(&request(&svc, "2030-01-02", "10:00")).unwrap();
    assert_eq!(second.status, BookingStatus::Pending);
}

#[test]
fn test_full_visit_lifecycle() {
    let db = Database::open_in_memory().unwrap();
    let rules = ClinicRules::default();
    let lifecycle = BookingLifecycle::new(&db, &rules, &LogNotifier).at(now());
    let svc = consult(&db);

    let booking = lifecycle.submit(&request(&svc, "2030-01-04", "14:00")).unwrap();
    let id = booking.booking_id;
    lifecycle.accept(&id, "dr.cruz").unwrap();
    lifecycle.start_consultation(&id, "dr.cruz").unwrap();
    lifecycle.finish_consultation(&id, "dr.cruz").unwrap();
    let done = lifecycle.complete(&id, "dr.cruz").unwrap();
    assert_eq!(done.status, BookingStatus::Completed);

    // Terminal states refuse further moves.
    assert!(matches!(
        lifecycle.cancel(&id, "dr.cruz"),
        Err(ClinicError::StaleBookingState { .. })
    ));
    assert!(matches!(
        lifecycle.delete_pending(&id, "dr.cruz"),
        Err(ClinicError::StaleBookingState { .. })
    ));
}

#[test]
fn test_returning_patient_is_reused() {
    let db = Database::open_in_memory().unwrap();
    let rules = ClinicRules::default();
    let lifecycle = BookingLifecycle::new(&db, &rules, &LogNotifier).at(now());
    let svc = consult(&db);

    let first = lifecycle.submit(&request(&svc, "2030-01-02", "09:00")).unwrap();
    let first = lifecycle.accept(&first.booking_id, "dr.cruz").unwrap();

    let mut repeat = request(&svc, "2030-01-09", "09:00");
    repeat.patient_email = "MARIA@example.com".into();
    let second = lifecycle.submit(&repeat).unwrap();
    let second = lifecycle.accept(&second.booking_id, "dr.cruz").unwrap();

    assert!(first.patient_created);
    assert!(!second.patient_created);
    assert_eq!(first.patient.patient_id, second.patient.patient_id);
    assert_eq!(count(&db, "patients"), 1);
    assert_eq!(count(&db, "medical_records"), 2);
}

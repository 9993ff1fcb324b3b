//! Slot allocator: decides whether a (service, date, time) is bookable.

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::debug;

use crate::config::ClinicRules;
use crate::db::Database;
use crate::error::{ClinicError, ClinicResult};
use crate::models::{Booking, Slot};

/// Who is asking for the slot. Staff may book same-day; the public may not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingChannel {
    Public,
    Staff,
}

/// Apply the calendar rules that need no stored state, in order:
/// lead time, open day, operating hours, slot alignment.
///
/// `blocked` carries the reason if the date is an ad-hoc closure.
pub fn validate_slot(
    rules: &ClinicRules,
    date: &NaiveDate,
    time: &NaiveTime,
    channel: BookingChannel,
    now: &NaiveDateTime,
    blocked: Option<&str>,
) -> ClinicResult<()> {
    let today = now.date();
    match channel {
        BookingChannel::Public => {
            let earliest = today
                .checked_add_days(Days::new(u64::from(rules.min_lead_days)))
                .unwrap_or(NaiveDate::MAX);
            if *date < earliest {
                return Err(ClinicError::InvalidDate {
                    date: *date,
                    earliest,
                });
            }
        }
        BookingChannel::Staff => {
            if *date < today || (*date == today && *time < now.time()) {
                return Err(ClinicError::InvalidDate {
                    date: *date,
                    earliest: today,
                });
            }
        }
    }

    if rules.is_closed_weekday(date) {
        return Err(ClinicError::ClinicClosed {
            date: *date,
            reason: format!("closed every {}", date.format("%A")),
        });
    }
    if let Some(reason) = blocked {
        return Err(ClinicError::ClinicClosed {
            date: *date,
            reason: reason.to_string(),
        });
    }

    if !rules.within_hours(time) {
        return Err(ClinicError::OutsideHours {
            time: *time,
            opening: rules.opening_time,
            closing: rules.closing_time,
        });
    }

    if !rules.is_slot_aligned(time) {
        return Err(ClinicError::InvalidSlotAlignment {
            time: *time,
            slot_minutes: rules.slot_minutes,
        });
    }

    Ok(())
}

/// Slot allocator bound to a database and the current rules.
pub struct SlotAllocator<'a> {
    db: &'a Database,
    rules: &'a ClinicRules,
}

impl<'a> SlotAllocator<'a> {
    pub fn new(db: &'a Database, rules: &'a ClinicRules) -> Self {
        Self { db, rules }
    }

    /// Run all five rules against current state.
    pub fn check(&self, slot: &Slot, channel: BookingChannel, now: &NaiveDateTime) -> ClinicResult<()> {
        let blocked = self.db.get_blocked_date(&slot.date)?;
        validate_slot(
            self.rules,
            &slot.date,
            &slot.time,
            channel,
            now,
            blocked.as_ref().map(|b| b.reason.as_str()),
        )?;

        if self.db.is_slot_taken(slot)? {
            return Err(slot_taken(slot));
        }
        Ok(())
    }

    /// Check the slot and insert the booking holding it.
    ///
    /// Call inside a write transaction. The unique index on active slots is
    /// the final arbiter: a racing insert that slipped past `check` still
    /// fails with `SlotTaken`.
    pub fn reserve(&self, booking: &Booking, channel: BookingChannel, now: &NaiveDateTime) -> ClinicResult<()> {
        let slot = booking.slot();
        self.check(&slot, channel, now)?;

        match self.db.insert_booking(booking) {
            Ok(()) => {
                debug!(booking_id = %booking.booking_id, date = %slot.date, time = %slot.time, "slot reserved");
                Ok(())
            }
            Err(e) if e.is_unique_violation() => Err(slot_taken(&slot)),
            Err(e) => Err(e.into()),
        }
    }

    /// Open slot times for a service on a date, as the given channel sees them.
    pub fn available_times(
        &self,
        service_id: &str,
        date: &NaiveDate,
        channel: BookingChannel,
        now: &NaiveDateTime,
    ) -> ClinicResult<Vec<NaiveTime>> {
        let blocked = self.db.get_blocked_date(date)?;
        let taken = self.db.taken_times(service_id, date)?;

        Ok(self
            .rules
            .time_slots()
            .into_iter()
            .filter(|time| !taken.contains(time))
            .filter(|time| {
                validate_slot(
                    self.rules,
                    date,
                    time,
                    channel,
                    now,
                    blocked.as_ref().map(|b| b.reason.as_str()),
                )
                .is_ok()
            })
            .collect())
    }
}

fn slot_taken(slot: &Slot) -> ClinicError {
    ClinicError::SlotTaken {
        date: slot.date,
        time: slot.time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PatientContact, Service, ValidatedBooking};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    // 2030-01-01 is a Tuesday
    fn now() -> NaiveDateTime {
        date("2030-01-01").and_time(time(10, 15))
    }

    fn public(d: &str, t: NaiveTime) -> ClinicResult<()> {
        validate_slot(&ClinicRules::default(), &date(d), &t, BookingChannel::Public, &now(), None)
    }

    #[test]
    fn test_lead_time_boundary() {
        assert!(matches!(public("2030-01-01", time(11, 0)), Err(ClinicError::InvalidDate { .. })));
        assert!(public("2030-01-02", time(8, 0)).is_ok());
    }

    #[test]
    fn test_closed_weekday_and_blocked_date() {
        // 2030-01-06 is a Sunday
        assert!(matches!(public("2030-01-06", time(9, 0)), Err(ClinicError::ClinicClosed { .. })));

        let blocked = validate_slot(
            &ClinicRules::default(),
            &date("2030-01-03"),
            &time(9, 0),
            BookingChannel::Public,
            &now(),
            Some("Staff training"),
        );
        match blocked {
            Err(ClinicError::ClinicClosed { reason, .. }) => assert_eq!(reason, "Staff training"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_hours_boundaries() {
        assert!(public("2030-01-02", time(17, 0)).is_ok());
        assert!(matches!(public("2030-01-02", time(17, 30)), Err(ClinicError::OutsideHours { .. })));
        assert!(matches!(public("2030-01-02", time(7, 30)), Err(ClinicError::OutsideHours { .. })));
    }

    #[test]
    fn test_alignment() {
        assert!(matches!(
            public("2030-01-02", time(9, 15)),
            Err(ClinicError::InvalidSlotAlignment { .. })
        ));
        assert!(matches!(
            public("2030-01-02", time(16, 59)),
            Err(ClinicError::InvalidSlotAlignment { .. })
        ));
    }

    #[test]
    fn test_rule_order_reports_date_first() {
        // Too early, a Sunday, out of hours and misaligned all at once
        let result = validate_slot(
            &ClinicRules::default(),
            &date("2029-12-30"),
            &time(20, 7),
            BookingChannel::Public,
            &now(),
            None,
        );
        assert!(matches!(result, Err(ClinicError::InvalidDate { .. })));
    }

    #[test]
    fn test_staff_same_day() {
        let rules = ClinicRules::default();
        let today = date("2030-01-01");
        assert!(validate_slot(&rules, &today, &time(11, 0), BookingChannel::Staff, &now(), None).is_ok());
        assert!(matches!(
            validate_slot(&rules, &today, &time(9, 0), BookingChannel::Staff, &now(), None),
            Err(ClinicError::InvalidDate { .. })
        ));
    }

    fn booking(service: &Service, d: &str, t: NaiveTime) -> Booking {
        Booking::from_request(&ValidatedBooking {
            slot: Slot {
                service_id: service.service_id.clone(),
                date: date(d),
                time: t,
            },
            contact: PatientContact {
                name: "Ana Reyes".into(),
                email: "ana@example.com".into(),
                phone: "09171234567".into(),
            },
            notes: String::new(),
        })
    }

    #[test]
    fn test_reserve_rejects_taken_slot() {
        let db = Database::open_in_memory().unwrap();
        let rules = ClinicRules::default();
        let service = Service::new("Consultation".into(), 50000);
        db.insert_service(&service).unwrap();
        let allocator = SlotAllocator::new(&db, &rules);

        allocator
            .reserve(&booking(&service, "2030-01-02", time(9, 0)), BookingChannel::Public, &now())
            .unwrap();
        let second = allocator.reserve(&booking(&service, "2030-01-02", time(9, 0)), BookingChannel::Public, &now());
        assert!(matches!(second, Err(ClinicError::SlotTaken { .. })));

        // Same time, other service is free
        let other = Service::new("Facial".into(), 80000);
        db.insert_service(&other).unwrap();
        allocator
            .reserve(&booking(&other, "2030-01-02", time(9, 0)), BookingChannel::Public, &now())
            .unwrap();
    }

    #[test]
    fn test_available_times() {
        let db = Database::open_in_memory().unwrap();
        let rules = ClinicRules::default();
        let service = Service::new("Consultation".into(), 50000);
        db.insert_service(&service).unwrap();
        let allocator = SlotAllocator::new(&db, &rules);
        allocator
            .reserve(&booking(&service, "2030-01-02", time(9, 0)), BookingChannel::Public, &now())
            .unwrap();

        let open = allocator
            .available_times(&service.service_id, &date("2030-01-02"), BookingChannel::Public, &now())
            .unwrap();
        assert_eq!(open.len(), 18);
        assert!(!open.contains(&time(9, 0)));

        db.add_blocked_date(&date("2030-01-03"), "Holiday", None).unwrap();
        assert!(allocator
            .available_times(&service.service_id, &date("2030-01-03"), BookingChannel::Public, &now())
            .unwrap()
            .is_empty());
    }
}

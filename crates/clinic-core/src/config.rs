//! Clinic operating rules.
//!
//! Rules load from JSON (file or string) and persist in the single-row
//! `clinic_settings` table so staff can change them at runtime.

use std::path::Path;

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Cents;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read rules file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid rules JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid rules: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Operating rules applied by the slot allocator and billing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ClinicRules {
    /// Official clinic name (used in notifications)
    pub clinic_name: String,
    /// First bookable slot of the day
    #[serde(with = "hhmm")]
    pub opening_time: NaiveTime,
    /// Last bookable slot of the day (inclusive)
    #[serde(with = "hhmm")]
    pub closing_time: NaiveTime,
    /// Slot granularity; times must fall on multiples of this from midnight
    pub slot_minutes: u32,
    /// Weekly rest days
    pub closed_weekdays: Vec<Weekday>,
    /// Minimum days between today and a publicly booked date
    pub min_lead_days: u32,
    /// Fee billed when a service has no price set
    pub default_service_fee: Cents,
}

impl Default for ClinicRules {
    fn default() -> Self {
        Self {
            clinic_name: "Clinic".to_string(),
            opening_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
            closing_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
            slot_minutes: 30,
            closed_weekdays: vec![Weekday::Sun],
            min_lead_days: 1,
            default_service_fee: 50000,
        }
    }
}

impl ClinicRules {
    /// Parse and validate rules from a JSON string. Missing keys take defaults.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let rules: ClinicRules = serde_json::from_str(json)?;
        rules.validate()?;
        Ok(rules)
    }

    /// Load and validate rules from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.opening_time >= self.closing_time {
            return Err(ConfigError::Invalid(format!(
                "opening_time {} must be before closing_time {}",
                self.opening_time.format("%H:%M"),
                self.closing_time.format("%H:%M")
            )));
        }
        if self.slot_minutes == 0 || self.slot_minutes > 240 {
            return Err(ConfigError::Invalid(format!(
                "slot_minutes must be between 1 and 240, got {}",
                self.slot_minutes
            )));
        }
        if MINUTES_PER_DAY % self.slot_minutes != 0 {
            return Err(ConfigError::Invalid(format!(
                "slot_minutes {} must divide a day evenly",
                self.slot_minutes
            )));
        }
        if self.closed_weekdays.len() >= 7 {
            return Err(ConfigError::Invalid("clinic cannot be closed every day".into()));
        }
        if self.default_service_fee < 0 {
            return Err(ConfigError::Invalid("default_service_fee cannot be negative".into()));
        }
        Ok(())
    }

    pub fn is_closed_weekday(&self, date: &NaiveDate) -> bool {
        self.closed_weekdays.contains(&date.weekday())
    }

    /// True if `time` lies within operating hours, both ends inclusive.
    pub fn within_hours(&self, time: &NaiveTime) -> bool {
        *time >= self.opening_time && *time <= self.closing_time
    }

    /// True if `time` sits exactly on a slot boundary.
    pub fn is_slot_aligned(&self, time: &NaiveTime) -> bool {
        let minutes = time.hour() * 60 + time.minute();
        time.second() == 0 && time.nanosecond() == 0 && minutes % self.slot_minutes == 0
    }

    /// All bookable slot start times of a day, in order.
    pub fn time_slots(&self) -> Vec<NaiveTime> {
        let step = self.slot_minutes;
        (0..MINUTES_PER_DAY)
            .step_by(step as usize)
            .filter_map(|m| NaiveTime::from_hms_opt(m / 60, m % 60, 0))
            .filter(|t| self.within_hours(t))
            .collect()
    }
}

/// Serde adapter for `HH:MM` times.
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&s, "%H:%M").map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_defaults_are_valid() {
        let rules = ClinicRules::default();
        assert!(rules.validate().is_ok());
        assert_eq!(rules.opening_time, time(8, 0));
        assert_eq!(rules.closing_time, time(17, 0));
        assert_eq!(rules.slot_minutes, 30);
        assert_eq!(rules.closed_weekdays, vec![Weekday::Sun]);
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let rules = ClinicRules::from_json_str(
            r#"{"clinic_name": "Skin and Eye Clinic", "closed_weekdays": ["Sun", "Sat"]}"#,
        )
        .unwrap();
        assert_eq!(rules.clinic_name, "Skin and Eye Clinic");
        assert_eq!(rules.closed_weekdays, vec![Weekday::Sun, Weekday::Sat]);
        assert_eq!(rules.slot_minutes, 30);
    }

    #[test]
    fn test_rejects_unknown_keys() {
        assert!(ClinicRules::from_json_str(r#"{"slot_minute": 15}"#).is_err());
    }

    #[test]
    fn test_rejects_inverted_hours() {
        let result = ClinicRules::from_json_str(r#"{"opening_time": "17:00", "closing_time": "08:00"}"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_uneven_slot() {
        let result = ClinicRules::from_json_str(r#"{"slot_minutes": 7}"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_json_round_trip_uses_hhmm() {
        let json = ClinicRules::default().to_json().unwrap();
        assert!(json.contains("\"08:00\""));
        assert_eq!(ClinicRules::from_json_str(&json).unwrap(), ClinicRules::default());
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"slot_minutes": 60}}"#).unwrap();
        let rules = ClinicRules::from_json_file(file.path()).unwrap();
        assert_eq!(rules.slot_minutes, 60);
    }

    #[test]
    fn test_time_slots_include_closing_time() {
        let rules = ClinicRules::default();
        let slots = rules.time_slots();
        assert_eq!(slots.first(), Some(&time(8, 0)));
        assert_eq!(slots.last(), Some(&time(17, 0)));
        assert_eq!(slots.len(), 19);
    }

    #[test]
    fn test_alignment_and_hours() {
        let rules = ClinicRules::default();
        assert!(rules.is_slot_aligned(&time(9, 30)));
        assert!(!rules.is_slot_aligned(&time(9, 15)));
        assert!(rules.within_hours(&time(17, 0)));
        assert!(!rules.within_hours(&time(17, 1)));
        assert!(!rules.within_hours(&time(7, 59)));
    }
}

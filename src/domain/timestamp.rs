//! Canonical point-in-time representation used for persistence and cache payloads.
//!
//! Readings are stored as `YYYY-MM-DD HH:MM:SS` text in UTC with sub-second
//! precision dropped. Every externally supplied date goes through
//! [`Timestamp::parse_input`] before it reaches the store or a query bound.

use std::fmt;

use icelog_api_types::TimestampInput;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::{
    Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset, format_description::well_known::Rfc3339,
    macros::format_description,
};

use super::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(PrimitiveDateTime);

impl Timestamp {
    pub fn now() -> Self {
        Self::from_offset(OffsetDateTime::now_utc())
    }

    /// Convert to UTC and truncate to whole seconds.
    pub fn from_offset(value: OffsetDateTime) -> Self {
        let utc = value.to_offset(UtcOffset::UTC);
        let time = utc.time();
        let whole = Time::from_hms(time.hour(), time.minute(), time.second()).unwrap_or(time);
        Self(PrimitiveDateTime::new(utc.date(), whole))
    }

    pub fn from_unix_millis(millis: i64) -> Result<Self, DomainError> {
        let nanos = i128::from(millis) * 1_000_000;
        let value = OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .map_err(|_| DomainError::invalid_timestamp(millis.to_string()))?;
        Self::checked(value, || millis.to_string())
    }

    pub fn parse_input(input: &TimestampInput) -> Result<Self, DomainError> {
        match input {
            TimestampInput::Millis(millis) => Self::from_unix_millis(*millis),
            TimestampInput::Text(text) => Self::parse_text(text),
        }
    }

    /// Accepts RFC 3339, the canonical form, `T`-separated local forms (read as UTC)
    /// and bare dates (midnight UTC).
    pub fn parse_text(text: &str) -> Result<Self, DomainError> {
        let trimmed = text.trim();

        if let Ok(value) = OffsetDateTime::parse(trimmed, &Rfc3339) {
            return Self::checked(value, || trimmed.to_string());
        }

        let naive = PrimitiveDateTime::parse(
            trimmed,
            format_description!("[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"),
        )
        .or_else(|_| {
            PrimitiveDateTime::parse(
                trimmed,
                format_description!(
                    "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"
                ),
            )
        });
        if let Ok(value) = naive {
            return Self::checked(value.assume_utc(), || trimmed.to_string());
        }

        if let Ok(date) = Date::parse(trimmed, format_description!("[year]-[month]-[day]")) {
            return Ok(Self(PrimitiveDateTime::new(date, Time::MIDNIGHT)));
        }

        Err(DomainError::invalid_timestamp(trimmed))
    }

    fn checked(
        value: OffsetDateTime,
        input: impl FnOnce() -> String,
    ) -> Result<Self, DomainError> {
        let utc = value.to_offset(UtcOffset::UTC);
        if !(1..=9999).contains(&utc.year()) {
            return Err(DomainError::invalid_timestamp(input()));
        }
        Ok(Self::from_offset(utc))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .0
            .format(format_description!(
                "[year]-[month]-[day] [hour]:[minute]:[second]"
            ))
            .map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Timestamp::parse_text(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical(text: &str) -> String {
        Timestamp::parse_text(text).expect("valid timestamp").to_string()
    }

    #[test]
    fn rfc3339_is_converted_to_utc_and_truncated() {
        assert_eq!(canonical("2024-03-01T12:30:45.987Z"), "2024-03-01 12:30:45");
        assert_eq!(canonical("2024-03-01T08:00:00+08:00"), "2024-03-01 00:00:00");
    }

    #[test]
    fn canonical_and_local_forms_are_read_as_utc() {
        assert_eq!(canonical("2024-03-01 12:30:45"), "2024-03-01 12:30:45");
        assert_eq!(canonical("2024-03-01T12:30:45"), "2024-03-01 12:30:45");
        assert_eq!(canonical("2024-03-01T12:30:45.5"), "2024-03-01 12:30:45");
    }

    #[test]
    fn bare_date_means_midnight() {
        assert_eq!(canonical("2024-03-01"), "2024-03-01 00:00:00");
    }

    #[test]
    fn epoch_millis_are_accepted() {
        let ts = Timestamp::parse_input(&TimestampInput::Millis(1_700_000_000_123)).unwrap();
        assert_eq!(ts.to_string(), "2023-11-14 22:13:20");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(Timestamp::parse_text("yesterday").is_err());
        assert!(Timestamp::parse_text("2024-13-01").is_err());
    }

    #[test]
    fn serde_uses_canonical_text() {
        let ts = Timestamp::parse_text("2024-03-01T00:00:00Z").unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"2024-03-01 00:00:00\"");
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }
}
